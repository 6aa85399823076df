pub mod decoder;
pub mod http;

use std::sync::Arc;

use crate::domain::models::CouncilApi;

pub type CouncilApiBox = Arc<dyn CouncilApi + Send + Sync>;

pub struct ApiManager {}

impl ApiManager {
    pub fn get() -> CouncilApiBox {
        return Arc::new(http::HttpCouncil::default());
    }
}
