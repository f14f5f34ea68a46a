use crate::common::get_current_time_or_zero;
use log::{info, warn};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::Rng;

/// Custom epoch of the generated ids, in unix milliseconds.
pub(crate) const SNOWFLAKE_EPOCH: u64 = 1288834974657;
const NODE_ID_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const TIMESTAMP_LEFT_SHIFT: u64 = SEQUENCE_BITS + NODE_ID_BITS;

struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

/// Time ordered 64 bit id generator.
///
/// Layout, most significant bit first: 42 bits of milliseconds since
/// [SNOWFLAKE_EPOCH], 10 bits of node id, 12 bits of per-millisecond sequence.
pub struct SnowflakeIdGenerator {
    node_id: u64,
    sequence_mask: u64,
    state: Mutex<GeneratorState>,
}

impl SnowflakeIdGenerator {
    pub fn new() -> Self {
        let max_node_id = (1_u64 << NODE_ID_BITS) - 1;
        let mut node_id = Self::random_node_id();
        if node_id > max_node_id {
            warn!("Node id can't be greater than {}", max_node_id);
            node_id = OsRng.gen_range(1..=max_node_id);
        }
        info!("Initialized id generator with node id: {}", node_id);

        SnowflakeIdGenerator {
            node_id,
            sequence_mask: (1_u64 << SEQUENCE_BITS) - 1,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        }
    }

    pub fn get_id(&self) -> u64 {
        let mut state = self.state.lock();
        let mut timestamp = (get_current_time_or_zero() as u64).max(SNOWFLAKE_EPOCH);

        // clock moved backwards, stay on the last issued millisecond
        if timestamp < state.last_timestamp {
            timestamp = state.last_timestamp;
        }

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & self.sequence_mask;
            if state.sequence == 0 {
                timestamp = Self::wait_next_millis(state.last_timestamp);
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = timestamp;
        ((timestamp - SNOWFLAKE_EPOCH) << TIMESTAMP_LEFT_SHIFT)
            | (self.node_id << SEQUENCE_BITS)
            | state.sequence
    }

    /// Unix milliseconds embedded in an id produced by this generator.
    pub fn timestamp_of(id: u64) -> u64 {
        (id >> TIMESTAMP_LEFT_SHIFT) + SNOWFLAKE_EPOCH
    }

    fn wait_next_millis(last_timestamp: u64) -> u64 {
        let mut timestamp = get_current_time_or_zero() as u64;
        while timestamp <= last_timestamp {
            std::thread::yield_now();
            timestamp = get_current_time_or_zero() as u64;
        }
        timestamp
    }

    fn random_node_id() -> u64 {
        let uuid = uuid::Uuid::new_v4();
        let uid = uuid.as_bytes();
        let rnd_byte = OsRng.gen::<u64>() & 0x000000FF;

        ((0x000000FF & uid[uid.len() - 1] as u64) | (0x0000FF00 & (rnd_byte << 8))) >> 6
    }
}

impl Default for SnowflakeIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_unique_ids() {
        let generator = SnowflakeIdGenerator::new();
        let mut ids = Vec::new();
        for _ in 0..10_000 {
            ids.push(generator.get_id());
        }

        let mut unique_ids = ids.clone();
        unique_ids.sort();
        unique_ids.dedup();
        assert_eq!(ids.len(), unique_ids.len());
    }

    #[test]
    fn ids_are_monotonic() {
        let generator = SnowflakeIdGenerator::new();
        let mut last = 0;
        for _ in 0..1000 {
            let id = generator.get_id();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn handles_clock_backwards() {
        let generator = SnowflakeIdGenerator::new();
        let future = get_current_time_or_zero() as u64 + 1000;
        generator.state.lock().last_timestamp = future;
        let id = generator.get_id();
        assert_eq!(SnowflakeIdGenerator::timestamp_of(id), future);
    }

    #[test]
    fn embeds_node_id() {
        let generator = SnowflakeIdGenerator::new();
        let id = generator.get_id();
        let node_id = (id >> SEQUENCE_BITS) & ((1 << NODE_ID_BITS) - 1);
        assert_eq!(node_id, generator.node_id);
    }

    #[test]
    fn embeds_timestamp() {
        let generator = SnowflakeIdGenerator::new();
        let before = get_current_time_or_zero() as u64;
        let id = generator.get_id();
        let after = get_current_time_or_zero() as u64;
        let timestamp = SnowflakeIdGenerator::timestamp_of(id);
        assert!(timestamp >= before && timestamp <= after + 1);
    }
}
