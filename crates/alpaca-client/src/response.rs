//! Alpaca response envelope

use mount_control::DeviceError;
use serde::Deserialize;

/// Every Alpaca call answers with this envelope; `Value` is absent on
/// command (PUT) responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlpacaResponse<T> {
    pub value: Option<T>,
    #[serde(default)]
    pub error_number: i32,
    #[serde(default)]
    pub error_message: String,
    #[serde(rename = "ClientTransactionID", default)]
    pub client_transaction_id: u32,
    #[serde(rename = "ServerTransactionID", default)]
    pub server_transaction_id: u32,
}

impl<T> AlpacaResponse<T> {
    fn check(&self) -> Result<(), DeviceError> {
        if self.error_number != 0 {
            return Err(DeviceError::Rejected {
                code: self.error_number,
                message: self.error_message.clone(),
            });
        }
        Ok(())
    }

    pub fn into_value(self) -> Result<T, DeviceError> {
        self.check()?;
        self.value
            .ok_or_else(|| DeviceError::UnexpectedValue("response carried no Value".into()))
    }

    pub fn into_unit(self) -> Result<(), DeviceError> {
        self.check()
    }
}
