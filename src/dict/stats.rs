use std::fmt;

use crate::dict::dict::Dict;
use crate::dict::lib::DICT_STATS_VECTLEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictStats {
    pub ht_idx: usize,
    /// buckets holding at least one entry
    pub buckets: u64,
    pub max_chain_len: u64,
    pub total_chain_len: u64,
    pub ht_size: u64,
    pub ht_used: u64,
    /// cl_vector[i] = number of buckets with a chain of length i, the last
    /// slot collects every longer chain
    pub cl_vector: Vec<u64>,
}

impl DictStats {
    fn table_type(&self) -> &'static str {
        if self.ht_idx == 0 {
            "main hash table"
        } else {
            "rehashing target"
        }
    }
}

impl fmt::Display for DictStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ht_used == 0 {
            return writeln!(
                f,
                "Hash table {} stats ({}):\n No stats available for empty dictionaries",
                self.ht_idx,
                self.table_type()
            );
        }
        writeln!(
            f,
            "Hash table {} stats ({}):\n table size: {}\n number of elements: {}",
            self.ht_idx,
            self.table_type(),
            self.ht_size,
            self.ht_used
        )?;
        writeln!(
            f,
            " different slots: {}\n max chain length: {}\n avg chain length (counted): {:.2}\n avg chain length (computed): {:.2}\n Chain length distribution:",
            self.buckets,
            self.max_chain_len,
            self.total_chain_len as f64 / self.buckets as f64,
            self.ht_used as f64 / self.buckets as f64
        )?;
        for (len, &count) in self.cl_vector.iter().enumerate() {
            if count == 0 {
                continue;
            }
            writeln!(
                f,
                "   {}: {} ({:.2}%)",
                len,
                count,
                count as f64 * 100.0 / self.ht_size as f64
            )?;
        }
        Ok(())
    }
}

impl<K, V> Dict<K, V> {
    fn table_stats(&self, ht_idx: usize) -> DictStats {
        let ht = &self.ht[ht_idx];
        let mut stats = DictStats {
            ht_idx,
            buckets: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            ht_size: ht.size(),
            ht_used: ht.used,
            cl_vector: vec![0; DICT_STATS_VECTLEN],
        };
        if ht.used == 0 {
            return stats;
        }
        for head in &ht.table {
            let mut chain_len = 0u64;
            let mut he = *head;
            while let Some(id) = he {
                chain_len += 1;
                he = self.entries[id].next;
            }
            let slot = (chain_len as usize).min(DICT_STATS_VECTLEN - 1);
            stats.cl_vector[slot] += 1;
            if chain_len == 0 {
                continue;
            }
            stats.buckets += 1;
            stats.max_chain_len = stats.max_chain_len.max(chain_len);
            stats.total_chain_len += chain_len;
        }
        stats
    }

    /// One report per live generation, main table first.
    pub fn stats(&self) -> Vec<DictStats> {
        let mut stats = vec![self.table_stats(0)];
        if self.dict_is_rehashing() {
            stats.push(self.table_stats(1));
        }
        stats
    }
}
