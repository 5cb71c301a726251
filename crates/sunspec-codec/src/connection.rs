use modbus_client::RegisterTransport;
use tokio::sync::OnceCell;
use tracing::info;

use crate::model::{ModelAddress, RegisterModel};
use crate::models::{
    CommonModel, ControlsModel, ControlsWrite, InverterModel, MeterModel, NameplateModel,
    SettingsModel, StatusModel, COMMON_IDS, COMMON_MODEL, CONTROLS_IDS, CONTROLS_MODEL,
    INVERTER_IDS, INVERTER_MODEL, METER_IDS, METER_MODEL, NAMEPLATE_IDS, NAMEPLATE_MODEL,
    SETTINGS_IDS, SETTINGS_MODEL, STATUS_IDS, STATUS_MODEL,
};
use crate::{discover_models, CodecError, ModelDefinition};

/// Typed SunSpec access to one device.
///
/// The model map is scanned once. Concurrent first callers share a single scan, later callers
/// read the cached map. A failed scan leaves the cell empty so the next call scans again.
pub struct SunSpecConnection<T> {
    transport: T,
    base_address: u16,
    models: OnceCell<Vec<ModelDefinition>>,
}

impl<T> SunSpecConnection<T>
where
    T: RegisterTransport,
{
    pub fn new(transport: T, base_address: u16) -> Self {
        Self {
            transport,
            base_address,
            models: OnceCell::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn models(&self) -> Result<&[ModelDefinition], CodecError> {
        let models = self
            .models
            .get_or_try_init(|| async {
                let models = discover_models(&self.transport, self.base_address).await?;
                info!(
                    base_address = self.base_address,
                    count = models.len(),
                    "sunspec model map scanned"
                );
                Ok::<_, CodecError>(models)
            })
            .await?;
        Ok(models.as_slice())
    }

    /// Address of the first model matching `ids`, honouring the order of `ids`.
    pub async fn find(&self, ids: &[u16]) -> Result<ModelAddress, CodecError> {
        let models = self.models().await?;
        ids.iter()
            .find_map(|id| models.iter().find(|model| model.id == *id))
            .map(ModelDefinition::address)
            .ok_or(CodecError::ModelNotFound(ids.first().copied().unwrap_or_default()))
    }

    async fn read_model<R, W>(
        &self,
        model: &RegisterModel<R, W>,
        ids: &[u16],
    ) -> Result<R, CodecError>
    where
        R: Default + Send,
        W: Sync,
    {
        let address = self.find(ids).await?;
        model.read(&self.transport, address).await
    }

    pub async fn get_common(&self) -> Result<CommonModel, CodecError> {
        self.read_model(&COMMON_MODEL, COMMON_IDS).await
    }

    pub async fn get_inverter(&self) -> Result<InverterModel, CodecError> {
        self.read_model(&INVERTER_MODEL, INVERTER_IDS).await
    }

    pub async fn get_nameplate(&self) -> Result<NameplateModel, CodecError> {
        self.read_model(&NAMEPLATE_MODEL, NAMEPLATE_IDS).await
    }

    pub async fn get_settings(&self) -> Result<SettingsModel, CodecError> {
        self.read_model(&SETTINGS_MODEL, SETTINGS_IDS).await
    }

    pub async fn get_status(&self) -> Result<StatusModel, CodecError> {
        self.read_model(&STATUS_MODEL, STATUS_IDS).await
    }

    pub async fn get_controls(&self) -> Result<ControlsModel, CodecError> {
        self.read_model(&CONTROLS_MODEL, CONTROLS_IDS).await
    }

    pub async fn get_meter(&self) -> Result<MeterModel, CodecError> {
        self.read_model(&METER_MODEL, METER_IDS).await
    }

    pub async fn write_controls(&self, values: &ControlsWrite) -> Result<(), CodecError> {
        let address = self.find(CONTROLS_IDS).await?;
        CONTROLS_MODEL.write(values, &self.transport, address).await
    }
}
