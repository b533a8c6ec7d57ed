/// Growable set of client indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientBitset {
    words: Vec<u64>,
}

impl ClientBitset {
    pub fn get(&self, client: usize) -> bool {
        self.words
            .get(client / 64)
            .is_some_and(|word| word & (1u64 << (client % 64)) != 0)
    }

    pub fn set(&mut self, client: usize, value: bool) {
        let word = client / 64;
        if value {
            if word >= self.words.len() {
                self.words.resize(word + 1, 0);
            }
            self.words[word] |= 1u64 << (client % 64);
        } else if let Some(bits) = self.words.get_mut(word) {
            *bits &= !(1u64 << (client % 64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear_bits() {
        let mut bits = ClientBitset::default();
        assert!(!bits.get(130));

        bits.set(130, true);
        bits.set(3, true);
        assert!(bits.get(130));
        assert!(bits.get(3));
        assert!(!bits.get(2));

        bits.set(130, false);
        bits.set(1000, false);
        assert!(!bits.get(130));
        assert!(bits.get(3));
        assert!(!bits.get(1000));
    }
}
