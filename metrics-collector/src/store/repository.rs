use super::{MetricStore, StoreError, StoreStats};
use crate::models::{MetricIn, MetricRecord};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::Semaphore;

/// Format unique des bornes de requête : `2024-03-01 12:00:00.000+0100`
pub const TIME_BOUND_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory][offset_minute]"
);

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid {field} '{value}': {reason}")]
    InvalidTimeBound {
        field: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse une borne textuelle. Pas de repli silencieux sur "maintenant".
pub fn parse_time_bound(field: &'static str, value: &str) -> Result<OffsetDateTime, QueryError> {
    OffsetDateTime::parse(value.trim(), TIME_BOUND_FORMAT).map_err(|e| QueryError::InvalidTimeBound {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Façade async du store partagée par toutes les requêtes HTTP.
///
/// Chaque opération prend un permis du pool (taille bornée), s'exécute sur le
/// pool bloquant de tokio et échoue en `StoreError::Timeout` au-delà du délai.
/// Aucun retry ici : c'est à l'appelant de décider.
#[derive(Clone)]
pub struct MetricsRepository {
    store: Arc<dyn MetricStore>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl MetricsRepository {
    pub fn new(store: Arc<dyn MetricStore>, pool_size: usize, timeout: Duration) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            timeout,
        }
    }

    /// Écrit une observation ; `observed_at` est assigné ici, jamais par le client.
    pub async fn insert(&self, input: MetricIn) -> Result<MetricRecord, StoreError> {
        let record = input.into_record(OffsetDateTime::now_utc());
        self.run(move |store| {
            store.insert(&record)?;
            Ok(record)
        })
        .await
    }

    pub async fn get_latest(&self, host_ip: &str) -> Result<Option<MetricRecord>, StoreError> {
        let host_ip = host_ip.to_string();
        self.run(move |store| store.latest(&host_ip)).await
    }

    pub async fn get_range(
        &self,
        host_ip: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<MetricRecord>, StoreError> {
        let host_ip = host_ip.to_string();
        self.run(move |store| store.range(&host_ip, start, end)).await
    }

    /// Variante de `get_range` avec bornes au format [`TIME_BOUND_FORMAT`]
    pub async fn get_range_text(
        &self,
        host_ip: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<MetricRecord>, QueryError> {
        let start = parse_time_bound("start_time", start)?;
        let end = parse_time_bound("end_time", end)?;
        Ok(self.get_range(host_ip, start, end).await?)
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.run(|store| store.stats()).await
    }

    async fn run<F, R>(&self, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&dyn MetricStore) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        let permits = self.permits.clone();

        let task = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| StoreError::Unavailable("store pool closed".into()))?;
            tokio::task::spawn_blocking(move || {
                // le permis reste pris tant que le moteur travaille, même après un timeout
                let _permit = permit;
                op(store.as_ref())
            })
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
        };

        tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PartitionedStore;

    fn input(ip: &str, cpu: f32, mem: f32, disk: f32) -> MetricIn {
        MetricIn {
            host_ip: ip.into(),
            host_name: "web-01".into(),
            cpu_pct: cpu,
            mem_pct: mem,
            disk_pct: disk,
        }
    }

    fn repo() -> MetricsRepository {
        MetricsRepository::new(Arc::new(PartitionedStore::in_memory()), 4, Duration::from_secs(5))
    }

    /// Moteur qui dort avant de répondre
    struct SlowStore(Duration);

    impl MetricStore for SlowStore {
        fn insert(&self, _record: &MetricRecord) -> Result<(), StoreError> {
            std::thread::sleep(self.0);
            Ok(())
        }
        fn latest(&self, _host_ip: &str) -> Result<Option<MetricRecord>, StoreError> {
            std::thread::sleep(self.0);
            Ok(None)
        }
        fn range(&self, _: &str, _: OffsetDateTime, _: OffsetDateTime) -> Result<Vec<MetricRecord>, StoreError> {
            std::thread::sleep(self.0);
            Ok(Vec::new())
        }
        fn stats(&self) -> Result<StoreStats, StoreError> {
            Ok(StoreStats::default())
        }
    }

    #[test]
    fn test_parse_time_bound_accepts_fixed_format() {
        let t = parse_time_bound("start_time", "2024-03-01 12:00:00.250+0100").unwrap();
        assert_eq!(t, time::macros::datetime!(2024-03-01 11:00:00.25 UTC));
    }

    #[test]
    fn test_parse_time_bound_rejects_other_formats() {
        for bad in [
            "",
            "now",
            "2024-03-01T12:00:00Z",
            "2024-03-01 12:00:00+0100",
            "2024-03-01 12:00:00.000+01:00",
            "2024-13-01 12:00:00.000+0000",
        ] {
            let err = parse_time_bound("end_time", bad).unwrap_err();
            assert!(matches!(err, QueryError::InvalidTimeBound { field: "end_time", .. }), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_server_time() {
        let repo = repo();
        let before = OffsetDateTime::now_utc();
        let written = repo.insert(input("10.0.0.1", 10.0, 20.0, 30.0)).await.unwrap();
        assert!(written.observed_at >= before);

        let latest = repo.get_latest("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(latest.observed_at, written.observed_at);
        assert_eq!((latest.cpu_pct, latest.mem_pct, latest.disk_pct), (10.0, 20.0, 30.0));
    }

    #[tokio::test]
    async fn test_latest_missing_host_is_not_an_error() {
        assert!(repo().get_latest("192.168.1.1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_text_returns_most_recent_first() {
        let repo = repo();
        let first = repo.insert(input("10.0.0.1", 10.0, 20.0, 30.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = repo.insert(input("10.0.0.1", 50.0, 60.0, 70.0)).await.unwrap();

        let rows = repo
            .get_range(&first.host_ip, first.observed_at, second.observed_at)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cpu_pct, 50.0);
        assert_eq!(rows[1].cpu_pct, 10.0);

        let rows = repo
            .get_range_text("10.0.0.1", "2000-01-01 00:00:00.000+0000", "2999-01-01 00:00:00.000+0000")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_range_text_rejects_bad_bound() {
        let err = repo()
            .get_range_text("10.0.0.1", "yesterday", "2999-01-01 00:00:00.000+0000")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidTimeBound { field: "start_time", .. }));
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let repo = MetricsRepository::new(
            Arc::new(SlowStore(Duration::from_millis(300))),
            2,
            Duration::from_millis(30),
        );
        let err = repo.get_latest("10.0.0.1").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }
}
