use crate::config::Config;
use crate::service::HistoryService;

pub struct AppState {
    pub config: Config,
    pub service: HistoryService,
}
