//! [`GenePool`] – the payload exchanged between peers.
//!
//! A fixed-length integer sequence broadcast as `"[a, b, c, ...]"`.  Each
//! successful exchange with a peer fills one more slot from the previous
//! local gene, the peer's gene at the same position, and a bounded random
//! mutation.  Once the cursor reaches the end the pool is saturated and
//! further exchanges leave it unchanged.

use puckbot_types::PuckError;
use rand::Rng;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenePool {
    genes: Vec<i32>,
    cursor: usize,
    max_mutation: i32,
}

impl GenePool {
    pub fn new(length: usize, max_mutation: i32) -> Self {
        Self {
            genes: vec![0; length],
            cursor: 0,
            max_mutation: max_mutation.max(0),
        }
    }

    pub fn genes(&self) -> &[i32] {
        &self.genes
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_saturated(&self) -> bool {
        self.cursor + 2 >= self.genes.len()
    }

    /// Text broadcast by the transponder.
    pub fn to_payload(&self) -> String {
        format!("{:?}", self.genes)
    }

    /// Parse a peer payload of exactly this pool's length.
    pub fn parse(&self, payload: &str) -> Result<Vec<i32>, PuckError> {
        let malformed = || PuckError::MalformedPayload(payload.to_string());
        let body = payload
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(malformed)?;
        let peer = body
            .split(',')
            .map(|g| g.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed())?;
        if peer.len() != self.genes.len() {
            return Err(malformed());
        }
        Ok(peer)
    }

    /// Combine with `peer`.  Returns `false` when the pool is saturated.
    pub fn exchange<R: Rng + ?Sized>(&mut self, peer: &[i32], rng: &mut R) -> bool {
        if self.is_saturated() || peer.len() != self.genes.len() {
            return false;
        }
        self.cursor += 1;
        let g = self.cursor;
        let mutation = if self.max_mutation > 0 {
            rng.random_range(0..self.max_mutation)
        } else {
            0
        };
        self.genes[g] = self.genes[g - 1]
            .saturating_add(peer[g - 1])
            .saturating_add(mutation);
        info!(slot = g, gene = self.genes[g], mutation, "genes exchanged");
        true
    }

    /// Parse `payload` and exchange with it.
    pub fn exchange_payload<R: Rng + ?Sized>(&mut self, payload: &str, rng: &mut R) -> Result<bool, PuckError> {
        let peer = self.parse(payload)?;
        Ok(self.exchange(&peer, rng))
    }
}

impl Default for GenePool {
    fn default() -> Self {
        Self::new(10, 4)
    }
}
