use crate::{RegistryError, TxContext};
use shiptrack_common::{Asset, AssetFields, decode_asset, encode_asset};
use shiptrack_state::{ScanGuard, WorldState};

/// Genesis records written by [`AssetRegistry::init_ledger`].
pub fn seed_assets() -> Vec<Asset> {
    vec![Asset::new(
        "shipment1",
        AssetFields {
            temperature: 74,
            humidity: 85,
            vibration: 0,
            shock: false,
            location: 22.36254,
        },
    )]
}

/// The registry's operation set. Stateless; every call works through the
/// [`TxContext`] it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssetRegistry;

impl AssetRegistry {
    /// Create the registry. It holds no state of its own.
    pub fn new() -> Self {
        Self
    }

    /// Write the seed records unconditionally, overwriting any record with a
    /// seed id. Running it again reproduces the same values; it does not
    /// detect re-initialization.
    pub fn init_ledger<S: WorldState>(
        &self,
        ctx: &mut TxContext<'_, S>,
    ) -> Result<(), RegistryError> {
        let _span = tracing::debug_span!("init_ledger", tx = %ctx.tx_id()).entered();
        let seeds = seed_assets();
        for asset in &seeds {
            put_asset(ctx, asset)?;
        }
        tracing::info!(count = seeds.len(), "ledger initialized");
        Ok(())
    }

    /// Whether a non-empty record is stored under `id`.
    pub fn asset_exists<S: WorldState>(
        &self,
        ctx: &TxContext<'_, S>,
        id: &str,
    ) -> Result<bool, RegistryError> {
        let value = ctx.state().get(id)?;
        Ok(value.is_some_and(|bytes| !bytes.is_empty()))
    }

    /// Store a new, unowned record. Fails with `Conflict` if `id` is taken.
    ///
    /// The existence check and the write are only atomic if the host runs
    /// this call under serializable access to the world state.
    pub fn create_asset<S: WorldState>(
        &self,
        ctx: &mut TxContext<'_, S>,
        id: &str,
        fields: AssetFields,
    ) -> Result<(), RegistryError> {
        let _span = tracing::debug_span!("create_asset", tx = %ctx.tx_id(), id).entered();
        if id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "asset id must not be empty".into(),
            ));
        }
        if self.asset_exists(ctx, id)? {
            return Err(RegistryError::Conflict(id.to_string()));
        }
        put_asset(ctx, &Asset::new(id, fields))?;
        tracing::info!(id, "asset created");
        Ok(())
    }

    /// Decode the record stored under `id`. Fails with `NotFound` if absent.
    pub fn read_asset<S: WorldState>(
        &self,
        ctx: &TxContext<'_, S>,
        id: &str,
    ) -> Result<Asset, RegistryError> {
        match ctx.state().get(id)? {
            Some(bytes) if !bytes.is_empty() => Ok(decode_asset(id, &bytes)?),
            _ => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    /// Replace every sensor field of an existing record. The current owner
    /// is carried over, so the prior record is decoded first: a corrupt
    /// prior record blocks the update with `Encoding` and is left in place.
    pub fn update_asset<S: WorldState>(
        &self,
        ctx: &mut TxContext<'_, S>,
        id: &str,
        fields: AssetFields,
    ) -> Result<(), RegistryError> {
        let _span = tracing::debug_span!("update_asset", tx = %ctx.tx_id(), id).entered();
        if !self.asset_exists(ctx, id)? {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        let mut asset = self.read_asset(ctx, id)?;
        asset.set_fields(fields);
        put_asset(ctx, &asset)?;
        tracing::info!(id, "asset updated");
        Ok(())
    }

    /// Remove an existing record. No tombstone is left behind.
    pub fn delete_asset<S: WorldState>(
        &self,
        ctx: &mut TxContext<'_, S>,
        id: &str,
    ) -> Result<(), RegistryError> {
        let _span = tracing::debug_span!("delete_asset", tx = %ctx.tx_id(), id).entered();
        if !self.asset_exists(ctx, id)? {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        ctx.state_mut().delete(id)?;
        tracing::info!(id, "asset deleted");
        Ok(())
    }

    /// Set the owner of an existing record, leaving every other field as is.
    pub fn transfer_asset<S: WorldState>(
        &self,
        ctx: &mut TxContext<'_, S>,
        id: &str,
        new_owner: &str,
    ) -> Result<(), RegistryError> {
        let _span = tracing::debug_span!("transfer_asset", tx = %ctx.tx_id(), id).entered();
        if new_owner.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "new owner must not be empty".into(),
            ));
        }
        let mut asset = self.read_asset(ctx, id)?;
        let previous = asset.owner.replace(new_owner.to_string());
        put_asset(ctx, &asset)?;
        tracing::info!(id, ?previous, new_owner, "asset transferred");
        Ok(())
    }

    /// Every record, in the world state's key order.
    pub fn get_all_assets<S: WorldState>(
        &self,
        ctx: &TxContext<'_, S>,
    ) -> Result<Vec<Asset>, RegistryError> {
        self.get_assets_by_range(ctx, "", "")
    }

    /// Records with keys in `[start, end)`; an empty bound is open.
    ///
    /// The first malformed record fails the whole call. The scan cursor is
    /// closed on every exit path.
    pub fn get_assets_by_range<S: WorldState>(
        &self,
        ctx: &TxContext<'_, S>,
        start: &str,
        end: &str,
    ) -> Result<Vec<Asset>, RegistryError> {
        let _span =
            tracing::debug_span!("get_assets_by_range", tx = %ctx.tx_id(), start, end).entered();
        let mut scan = ScanGuard::new(ctx.state().range_scan(start, end)?);
        let mut assets = Vec::new();
        for item in scan.by_ref() {
            let (key, bytes) = item?;
            if bytes.is_empty() {
                continue;
            }
            assets.push(decode_asset(&key, &bytes)?);
        }
        scan.finish()?;
        tracing::debug!(count = assets.len(), "scan complete");
        Ok(assets)
    }
}

fn put_asset<S: WorldState>(
    ctx: &mut TxContext<'_, S>,
    asset: &Asset,
) -> Result<(), RegistryError> {
    let bytes = encode_asset(asset)?;
    ctx.state_mut().put(&asset.id, bytes)?;
    Ok(())
}
