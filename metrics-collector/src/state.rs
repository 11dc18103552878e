use crate::health::HealthTracker;
use crate::store::MetricsRepository;

/// État unique partagé par les handlers Axum. Pas d'état mutable applicatif :
/// le seul point de concurrence est le pool du repository.
#[derive(Clone)]
pub struct AppState {
    pub repo: MetricsRepository,
    pub health: HealthTracker,
}
