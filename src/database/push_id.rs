use rand::Rng;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Generates chronologically sortable 20-character keys for `append`.
///
/// Eight characters encode the millisecond timestamp; the remaining twelve are
/// random and are incremented when two keys share a millisecond so that keys
/// stay unique and ordered.
#[derive(Debug, Default)]
pub(crate) struct PushIdGenerator {
    last_push_time: u64,
    last_rand_chars: [u8; 12],
}

impl PushIdGenerator {
    pub(crate) fn next_id(&mut self) -> String {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.next_id_at(now)
    }

    pub(crate) fn next_id_at(&mut self, mut now: u64) -> String {
        let duplicate_time = now == self.last_push_time;
        self.last_push_time = now;

        let mut timestamp_chars = [0u8; 8];
        for slot in timestamp_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(now % 64) as usize];
            now /= 64;
        }

        if duplicate_time {
            self.increment_random();
        } else {
            let mut rng = rand::thread_rng();
            for slot in self.last_rand_chars.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }

        let mut id = String::with_capacity(20);
        id.extend(timestamp_chars.iter().map(|ch| *ch as char));
        id.extend(
            self.last_rand_chars
                .iter()
                .map(|index| PUSH_CHARS[*index as usize] as char),
        );
        id
    }

    fn increment_random(&mut self) {
        let mut index = self.last_rand_chars.len();
        while index > 0 && self.last_rand_chars[index - 1] == 63 {
            self.last_rand_chars[index - 1] = 0;
            index -= 1;
        }
        if index > 0 {
            self.last_rand_chars[index - 1] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_in_same_millisecond_are_unique_and_ordered() {
        let mut generator = PushIdGenerator::default();
        let ids: Vec<String> = (0..200).map(|_| generator.next_id_at(1_700_000_000_000)).collect();

        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ids.iter().all(|id| id.len() == 20));
    }

    #[test]
    fn later_timestamps_sort_after_earlier_ones() {
        let mut generator = PushIdGenerator::default();
        let first = generator.next_id_at(1_000);
        let second = generator.next_id_at(2_000);
        assert!(first[..8] < second[..8]);
    }
}
