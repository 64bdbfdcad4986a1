pub mod gateway;
pub mod repair;
pub mod transport;

use crate::error::GatewayError;
use crate::journal::config::{Credentials, ModelConfig};
use gateway::ModelGateway;
use transport::{Transport, select_transport};

pub type DefaultGateway = ModelGateway<Box<dyn Transport>>;

pub fn gateway_from_config(
    cfg: &ModelConfig,
    creds: &Credentials,
) -> Result<DefaultGateway, GatewayError> {
    Ok(ModelGateway::new(select_transport(cfg, creds)?))
}
