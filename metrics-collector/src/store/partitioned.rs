/**
 * MOTEUR PARTITIONNÉ - une map ordonnée par host_ip
 *
 * - Lecture "latest" = première entrée de la partition
 * - Lecture "range" = sous-intervalle contigu de la BTreeMap
 * - Journal JSON-lines append-only (optionnel), rejoué à l'ouverture
 */

use super::{MetricStore, StoreError, StoreStats};
use crate::models::MetricRecord;
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tracing::{info, warn};

/// metric_time décroissant, puis insertion la plus récente d'abord
type ClusterKey = (Reverse<OffsetDateTime>, Reverse<u64>);
type Partition = BTreeMap<ClusterKey, MetricRecord>;

pub struct PartitionedStore {
    partitions: RwLock<HashMap<String, Partition>>,
    next_seq: AtomicU64,
    journal: Option<Mutex<Journal>>,
}

/// `len` = taille du fichier après notre dernière écriture réussie
struct Journal {
    file: File,
    len: u64,
}

impl Journal {
    fn new(file: File) -> Result<Self, StoreError> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Ajoute une ligne complète ou rien.
    ///
    /// Une écriture partielle est annulée par troncature. Si la fin du fichier
    /// ne correspond plus à ce qu'on a écrit (troncature impossible, écriture
    /// externe), la ligne est précédée d'un '\n' pour ne pas fusionner avec un
    /// fragment.
    fn append(&mut self, line: &[u8]) -> Result<(), StoreError> {
        let start = self.file.metadata()?.len();
        if start != self.len && !ends_with_newline(&mut self.file)? {
            warn!(expected = self.len, actual = start, "journal tail is torn, starting a new line");
            self.file.write_all(b"\n")?;
        }
        let start = self.file.metadata()?.len();

        if let Err(e) = self.file.write_all(line) {
            if let Err(rollback) = self.file.set_len(start) {
                warn!(error = %rollback, "failed to roll back partial journal write");
            }
            return Err(e.into());
        }
        self.len = start + line.len() as u64;
        Ok(())
    }
}

impl PartitionedStore {
    /// Store volatile, perdu à l'arrêt du process
    pub fn in_memory() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            journal: None,
        }
    }

    /// Ouvre (ou crée) `<data_dir>/<keyspace>.jsonl` et rejoue son contenu
    pub fn open(data_dir: &Path, keyspace: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(format!("{keyspace}.jsonl"));

        let store = Self::in_memory();
        let replayed = store.replay(&path)?;

        let mut file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        if !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
        }
        info!(path = %path.display(), rows = replayed, "store journal opened");

        Ok(Self {
            journal: Some(Mutex::new(Journal::new(file)?)),
            ..store
        })
    }

    fn replay(&self, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            return Ok(0);
        }
        let reader = BufReader::new(File::open(path)?);
        let mut count = 0;
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MetricRecord>(&line) {
                Ok(record) => {
                    self.put(record);
                    count += 1;
                }
                // ligne tronquée par un arrêt brutal : on l'ignore
                Err(e) => warn!(line = n + 1, error = %e, "skipping unreadable journal line"),
            }
        }
        Ok(count)
    }

    fn put(&self, record: MetricRecord) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let key = (Reverse(record.observed_at), Reverse(seq));
        self.partitions
            .write()
            .entry(record.host_ip.clone())
            .or_default()
            .insert(key, record);
    }
}

/// Un fichier vide ou terminé par '\n' peut recevoir une nouvelle ligne tel quel
fn ends_with_newline(file: &mut File) -> Result<bool, StoreError> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl MetricStore for PartitionedStore {
    fn insert(&self, record: &MetricRecord) -> Result<(), StoreError> {
        let Some(journal) = &self.journal else {
            self.put(record.clone());
            return Ok(());
        };

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        // le verrou du journal garde l'ordre fichier == ordre de séquence
        let mut journal = journal.lock();
        journal.append(&line)?;
        self.put(record.clone());
        Ok(())
    }

    fn latest(&self, host_ip: &str) -> Result<Option<MetricRecord>, StoreError> {
        let partitions = self.partitions.read();
        Ok(partitions
            .get(host_ip)
            .and_then(|p| p.first_key_value())
            .map(|(_, record)| record.clone()))
    }

    fn range(
        &self,
        host_ip: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<MetricRecord>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let partitions = self.partitions.read();
        let Some(partition) = partitions.get(host_ip) else {
            return Ok(Vec::new());
        };

        let from = (Reverse(end), Reverse(u64::MAX));
        let to = (Reverse(start), Reverse(0));
        Ok(partition.range(from..=to).map(|(_, r)| r.clone()).collect())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let partitions = self.partitions.read();
        Ok(StoreStats {
            partitions: partitions.len(),
            rows: partitions.values().map(BTreeMap::len).sum(),
        })
    }
}
