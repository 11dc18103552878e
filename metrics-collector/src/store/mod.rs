/**
 * TIME-SERIES STORE - Persistance des observations par hôte
 *
 * RÔLE :
 * Stocke les MetricRecord et répond aux deux lectures du collecteur :
 * "dernier enregistrement d'un hôte" et "enregistrements d'un hôte sur [start, end]".
 *
 * SCHÉMA LOGIQUE :
 * - Partition = host_ip
 * - Clustering = metric_time DÉCROISSANT (+ séquence d'insertion pour les égalités)
 * - Colonnes = host_name, cpu, mem, disk
 *
 * Le dernier enregistrement est donc la première ligne de la partition, et une
 * requête par intervalle est un parcours contigu, sans scan global.
 *
 * FONCTIONNEMENT :
 * - MetricStore trait = contrat synchrone du moteur (insert / latest / range)
 * - PartitionedStore = moteur ordonné en mémoire + journal JSON-lines optionnel
 * - MetricsRepository = façade async : pool borné, timeout par opération, parsing des bornes
 */

mod partitioned;
mod repository;

pub use partitioned::PartitionedStore;
pub use repository::{MetricsRepository, QueryError};

use crate::models::MetricRecord;
use serde::Serialize;
use std::time::Duration;
use time::OffsetDateTime;

/// Erreurs du store. Toutes sont vues par l'appelant comme "store indisponible".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Volumétrie exposée par /system/health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub partitions: usize,
    pub rows: usize,
}

/// Contrat du moteur de stockage. Les appels peuvent bloquer ; le repository
/// les exécute hors de l'executor async.
pub trait MetricStore: Send + Sync {
    /// Ajoute une ligne. Aucune unicité sur (host_ip, observed_at).
    fn insert(&self, record: &MetricRecord) -> Result<(), StoreError>;

    /// Ligne au plus grand `observed_at` de la partition, `None` si vide.
    fn latest(&self, host_ip: &str) -> Result<Option<MetricRecord>, StoreError>;

    /// Lignes avec `observed_at` dans [start, end] inclus, plus récente d'abord.
    /// `start > end` donne une séquence vide.
    fn range(
        &self,
        host_ip: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<MetricRecord>, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;
}
