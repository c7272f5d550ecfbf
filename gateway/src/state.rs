use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::ha::cache::StateCache;
use crate::ha::HomeAssistant;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub ha: Arc<HomeAssistant>,
    pub cache: StateCache,
}
