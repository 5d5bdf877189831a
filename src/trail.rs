//! Branch-and-bound search for the best multi-round linear trail.
//!
//! The search fixes one round at a time. Round 0 seeds the trail with a
//! single active S-box and the best approximation per output mask; round 1
//! is unconstrained; every later round is forced by the Feistel two-round
//! shift rule `S-layer output of round r = output[r-2] ^ input[r-1]`,
//! pulled back through the post-S-box permutation into per-S-box bundles.
//! The final round keeps only the single best matching entry per S-box.
//!
//! Partial trails are pruned against the incumbent: since every extension
//! multiplies the piling-up value by a factor of magnitude at most one, a
//! partial trail whose value already falls below the incumbent's bias
//! cannot recover. The first completed trail is accepted unconditionally
//! to seed the incumbent.

use crate::bitvector::BitVector;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::feistel::Feistel;
use crate::sbox::LatEntry;

/// Observation hook for search progress. The search itself performs no
/// I/O; a driver that wants tracing installs an observer.
pub trait TrailObserver {
    /// Called when a candidate approximation is placed on a partial trail.
    fn on_extension(&mut self, _round: usize, _sbox: usize, _entry: &LatEntry) {}

    /// Called when a completed trail replaces the incumbent.
    fn on_improvement(&mut self, _trail: &LinearTrail) {}
}

/// An observer that ignores everything.
pub struct NullObserver;

impl TrailObserver for NullObserver {}

/// A completed linear trail over a fixed number of rounds.
#[derive(Clone, Debug)]
pub struct LinearTrail {
    /// Per round, the mask over the round function's input half block.
    pub input_masks: Vec<BitVector>,
    /// Per round, the mask over the round function's output half block.
    pub output_masks: Vec<BitVector>,
    /// Per round, the mask over the round key.
    pub key_masks: Vec<BitVector>,
    /// Signed probability-scale bias of each round's approximation.
    pub round_biases: Vec<f64>,
    /// Absolute combined bias `|2^(R-1) * prod round_biases|`.
    pub bias: f64,
}

/// Piling-up lemma: combined bias of independent approximations, kept
/// signed.
fn piling(biases: &[f64]) -> f64 {
    0.5 * biases.iter().map(|b| 2.0 * b).product::<f64>()
}

/// Immutable per-frame search state: masks and biases of the rounds fixed
/// so far.
#[derive(Clone)]
struct Partial {
    input_masks: Vec<BitVector>,
    output_masks: Vec<BitVector>,
    key_masks: Vec<BitVector>,
    round_biases: Vec<f64>,
    /// Biases of the S-boxes fixed so far within the current round.
    sbox_biases: Vec<f64>,
}

impl Partial {
    fn new(cipher: &Feistel, rounds: usize) -> Result<Partial> {
        let half = cipher.half_block_size();
        let key_width = cipher.sbox_in() * cipher.num_sboxes();

        let mut input_masks = Vec::with_capacity(rounds);
        let mut output_masks = Vec::with_capacity(rounds);
        let mut key_masks = Vec::with_capacity(rounds);
        for _ in 0..rounds {
            input_masks.push(BitVector::new(half)?);
            output_masks.push(BitVector::new(half)?);
            key_masks.push(BitVector::new(key_width)?);
        }

        Ok(Partial {
            input_masks,
            output_masks,
            key_masks,
            round_biases: vec![0.0; rounds],
            sbox_biases: vec![0.0; cipher.num_sboxes()],
        })
    }

    fn clear_round(&mut self, round: usize) -> Result<()> {
        let half = self.input_masks[round].size();
        let key_width = self.key_masks[round].size();
        self.input_masks[round] = BitVector::new(half)?;
        self.output_masks[round] = BitVector::new(half)?;
        self.key_masks[round] = BitVector::new(key_width)?;
        for bias in self.sbox_biases.iter_mut() {
            *bias = 0.0;
        }
        Ok(())
    }
}

/// Which decision a frame is about to make. The four branch shapes of the
/// search.
#[derive(Clone, Copy, Debug)]
enum Position {
    /// Round 0: one active S-box, best entry per non-zero output mask.
    Seed,
    /// Round 1: every LAT entry of every S-box.
    Free,
    /// Rounds 2..R-2: S-box `sbox` of round `round`, constrained to its
    /// bundle of the required S-layer output mask.
    Mid { round: usize, sbox: usize },
    /// Round R-1: single best entry per constrained S-box.
    Last { sbox: usize },
}

struct Frame {
    position: Position,
    partial: Partial,
}

pub struct TrailSearch<'a> {
    cipher: &'a Feistel,
    rounds: usize,
    cancel: CancelToken,
}

impl<'a> TrailSearch<'a> {
    pub fn new(cipher: &'a Feistel, rounds: usize) -> Result<TrailSearch<'a>> {
        if rounds == 0 || rounds > cipher.max_rounds() {
            return Err(Error::InvalidArgument(format!(
                "trail round count {} outside [1, {}]",
                rounds,
                cipher.max_rounds()
            )));
        }

        Ok(TrailSearch {
            cipher,
            rounds,
            cancel: CancelToken::new(),
        })
    }

    /// Installs a cancellation token checked once per expanded frame.
    pub fn with_cancel(mut self, cancel: CancelToken) -> TrailSearch<'a> {
        self.cancel = cancel;
        self
    }

    /// Number of rounds with an assigned bias when a frame at `position`
    /// is expanded. Only those participate in the pruning bound.
    fn assigned_rounds(&self, position: Position) -> usize {
        match position {
            Position::Seed => 0,
            Position::Free => 1,
            Position::Mid { round, sbox } => {
                if sbox == 0 {
                    round
                } else {
                    round + 1
                }
            }
            Position::Last { sbox } => {
                if sbox == 0 {
                    self.rounds - 1
                } else {
                    self.rounds
                }
            }
        }
    }

    fn viable(&self, partial: &Partial, through: usize, incumbent: &Option<LinearTrail>) -> bool {
        match incumbent {
            None => true,
            Some(best) => piling(&partial.round_biases[..through]).abs() >= best.bias,
        }
    }

    /// Writes one S-box approximation into round `round` of a partial
    /// trail. Rounds 0 and 1 have a single active S-box and assign their
    /// masks directly; later rounds OR each S-box's contribution in.
    fn place_entry(
        &self,
        partial: &mut Partial,
        round: usize,
        sbox_index: usize,
        input_mask: u64,
        output_mask: u64,
        merge: bool,
    ) -> Result<()> {
        let approx = self
            .cipher
            .round_approximation(sbox_index, input_mask, output_mask)?;

        if merge {
            partial.input_masks[round] = partial.input_masks[round].or(&approx.input)?;
            partial.key_masks[round] = partial.key_masks[round].or(&approx.key)?;
            partial.output_masks[round] = partial.output_masks[round].or(&approx.output)?;
        } else {
            partial.input_masks[round] = approx.input;
            partial.key_masks[round] = approx.key;
            partial.output_masks[round] = approx.output;
        }

        Ok(())
    }

    /// The S-box layer output mask forced on `round` by the two rounds
    /// before it, as per-S-box bundles.
    fn required_layer_mask(&self, partial: &Partial, round: usize) -> Result<BitVector> {
        let forced = partial.output_masks[round - 2].xor(&partial.input_masks[round - 1])?;
        self.cipher.post_sbox().inverse(&forced)
    }

    fn complete(
        &self,
        partial: Partial,
        incumbent: &mut Option<LinearTrail>,
        observer: &mut dyn TrailObserver,
    ) {
        let bias = piling(&partial.round_biases).abs();

        let accept = match incumbent {
            None => true,
            Some(best) => bias >= best.bias,
        };

        if accept {
            let trail = LinearTrail {
                input_masks: partial.input_masks,
                output_masks: partial.output_masks,
                key_masks: partial.key_masks,
                round_biases: partial.round_biases,
                bias,
            };
            observer.on_improvement(&trail);
            *incumbent = Some(trail);
        }
    }

    /// Position following a fully fixed round, or `None` when the trail is
    /// complete.
    fn next_round_position(&self, round: usize) -> Option<Position> {
        if round + 1 == self.rounds {
            return None;
        }

        match round {
            0 => Some(Position::Free),
            _ if round + 1 == self.rounds - 1 => Some(Position::Last { sbox: 0 }),
            _ => Some(Position::Mid {
                round: round + 1,
                sbox: 0,
            }),
        }
    }

    /// Runs the search to exhaustion and returns the best trail found.
    pub fn search(&self, observer: &mut dyn TrailObserver) -> Result<LinearTrail> {
        let num_sboxes = self.cipher.num_sboxes();
        let sbox_in = self.cipher.sbox_in();
        let sbox_out = self.cipher.sbox_out();
        let scale = (1u64 << sbox_in) as f64;

        let mut incumbent: Option<LinearTrail> = None;
        let mut stack = vec![Frame {
            position: Position::Seed,
            partial: Partial::new(self.cipher, self.rounds)?,
        }];

        while let Some(frame) = stack.pop() {
            self.cancel.check()?;

            // Re-check the bound: the incumbent may have improved since
            // this frame was pushed
            if !self.viable(
                &frame.partial,
                self.assigned_rounds(frame.position),
                &incumbent,
            ) {
                continue;
            }

            // Children are collected first and pushed in reverse so the
            // stack expands them in generation order
            let mut children = Vec::new();

            match frame.position {
                Position::Seed => {
                    for sbox_index in 0..num_sboxes {
                        let sbox = self.cipher.sbox(sbox_index);
                        for output_mask in 1..(1u64 << sbox_out) {
                            let entry = match sbox.best_for_output(output_mask) {
                                Some(entry) => *entry,
                                None => continue,
                            };

                            let mut child = frame.partial.clone();
                            child.round_biases[0] = entry.bias / scale;
                            self.place_entry(
                                &mut child,
                                0,
                                sbox_index,
                                entry.input,
                                output_mask,
                                false,
                            )?;

                            if !self.viable(&child, 1, &incumbent) {
                                continue;
                            }
                            observer.on_extension(0, sbox_index, &entry);

                            match self.next_round_position(0) {
                                Some(position) => children.push(Frame {
                                    position,
                                    partial: child,
                                }),
                                None => self.complete(child, &mut incumbent, observer),
                            }
                        }
                    }
                }

                Position::Free => {
                    for sbox_index in 0..num_sboxes {
                        for entry in self.cipher.sbox(sbox_index).lat() {
                            let mut child = frame.partial.clone();
                            child.round_biases[1] = entry.bias / scale;
                            self.place_entry(
                                &mut child,
                                1,
                                sbox_index,
                                entry.input,
                                entry.output,
                                false,
                            )?;

                            if !self.viable(&child, 2, &incumbent) {
                                continue;
                            }
                            observer.on_extension(1, sbox_index, entry);

                            match self.next_round_position(1) {
                                Some(position) => children.push(Frame {
                                    position,
                                    partial: child,
                                }),
                                None => self.complete(child, &mut incumbent, observer),
                            }
                        }
                    }
                }

                Position::Mid { round, sbox } => {
                    let mut base = frame.partial;
                    if sbox == 0 {
                        base.clear_round(round)?;
                    }

                    let layer_mask = self.required_layer_mask(&base, round)?;
                    let bundle =
                        layer_mask.get_slice_int(sbox * sbox_out, (sbox + 1) * sbox_out)?;

                    for entry in self.cipher.sbox(sbox).entries_for_output(bundle) {
                        let mut child = base.clone();
                        child.sbox_biases[sbox] = entry.bias / scale;
                        child.round_biases[round] = piling(&child.sbox_biases[..=sbox]);
                        self.place_entry(&mut child, round, sbox, entry.input, entry.output, true)?;

                        if !self.viable(&child, round + 1, &incumbent) {
                            continue;
                        }
                        observer.on_extension(round, sbox, entry);

                        if sbox + 1 < num_sboxes {
                            children.push(Frame {
                                position: Position::Mid {
                                    round,
                                    sbox: sbox + 1,
                                },
                                partial: child,
                            });
                        } else {
                            match self.next_round_position(round) {
                                Some(position) => children.push(Frame {
                                    position,
                                    partial: child,
                                }),
                                None => self.complete(child, &mut incumbent, observer),
                            }
                        }
                    }
                }

                Position::Last { sbox } => {
                    let round = self.rounds - 1;
                    let mut base = frame.partial;
                    if sbox == 0 {
                        base.clear_round(round)?;
                    }

                    let layer_mask = self.required_layer_mask(&base, round)?;
                    let bundle =
                        layer_mask.get_slice_int(sbox * sbox_out, (sbox + 1) * sbox_out)?;

                    // No later round depends on this choice, so only the
                    // best matching entry is kept
                    if let Some(&entry) = self.cipher.sbox(sbox).best_for_output(bundle) {
                        let mut child = base;
                        child.sbox_biases[sbox] = entry.bias / scale;
                        child.round_biases[round] = piling(&child.sbox_biases[..=sbox]);
                        self.place_entry(&mut child, round, sbox, entry.input, entry.output, true)?;

                        if self.viable(&child, round + 1, &incumbent) {
                            observer.on_extension(round, sbox, &entry);

                            if sbox + 1 < num_sboxes {
                                children.push(Frame {
                                    position: Position::Last { sbox: sbox + 1 },
                                    partial: child,
                                });
                            } else {
                                self.complete(child, &mut incumbent, observer);
                            }
                        }
                    }
                }
            }

            while let Some(child) = children.pop() {
                stack.push(child);
            }
        }

        incumbent.ok_or_else(|| {
            Error::InvalidArgument("search exhausted without completing a trail".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cipher::toy;
    use crate::feistel::FeistelConfig;
    use crate::sbox::Sbox;

    struct CountingObserver {
        extensions: usize,
        improvements: usize,
    }

    impl TrailObserver for CountingObserver {
        fn on_extension(&mut self, _round: usize, _sbox: usize, _entry: &LatEntry) {
            self.extensions += 1;
        }

        fn on_improvement(&mut self, _trail: &LinearTrail) {
            self.improvements += 1;
        }
    }

    fn zero_key_network() -> crate::feistel::Feistel {
        toy::network(BitVector::new(8).unwrap()).unwrap()
    }

    /// A four-round variant of the non-linear toy network, to exercise the
    /// constrained middle rounds.
    fn four_round_network() -> crate::feistel::Feistel {
        let sbox = Arc::new(Sbox::new(2, 2, vec![0, 0, 0, 1]).unwrap());
        crate::feistel::Feistel::new(FeistelConfig {
            block_size: 4,
            max_rounds: 4,
            initial_permutation: (0..4).collect(),
            final_permutation: (0..4).collect(),
            sboxes: vec![sbox],
            expansion: vec![0, 1],
            post_sbox: vec![0, 1],
            key_size: 8,
            key_schedule: vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]],
            master_key: BitVector::new(8).unwrap(),
        })
        .unwrap()
    }

    #[test]
    fn affine_network_reaches_maximal_bias() {
        // Every approximation of the affine toy S-box is deterministic,
        // so the best two-round trail has the maximal combined bias 1/2
        let net = zero_key_network();
        let search = TrailSearch::new(&net, 2).unwrap();
        let trail = search.search(&mut NullObserver).unwrap();

        assert_eq!(trail.round_biases.len(), 2);
        assert_eq!(trail.bias, 0.5);
        for bias in &trail.round_biases {
            assert_eq!(bias.abs(), 0.5);
        }
    }

    #[test]
    fn single_round_trail() {
        let net = zero_key_network();
        let search = TrailSearch::new(&net, 1).unwrap();
        let trail = search.search(&mut NullObserver).unwrap();

        assert_eq!(trail.round_biases.len(), 1);
        assert_eq!(trail.bias, 0.5);
        assert!(!trail.output_masks[0].is_zero());
    }

    #[test]
    fn search_is_deterministic() {
        let net = four_round_network();
        let first = TrailSearch::new(&net, 3)
            .unwrap()
            .search(&mut NullObserver)
            .unwrap();
        let second = TrailSearch::new(&net, 3)
            .unwrap()
            .search(&mut NullObserver)
            .unwrap();

        assert_eq!(first.bias, second.bias);
        assert_eq!(first.input_masks, second.input_masks);
        assert_eq!(first.output_masks, second.output_masks);
        assert_eq!(first.key_masks, second.key_masks);
    }

    #[test]
    fn constrained_rounds_obey_shift_rule() {
        let net = four_round_network();
        let search = TrailSearch::new(&net, 4).unwrap();
        let trail = search.search(&mut NullObserver).unwrap();

        assert_eq!(trail.round_biases.len(), 4);
        assert!(trail.bias > 0.0);

        // Every constrained round's output mask must equal
        // output[r-2] ^ input[r-1]
        for round in 2..4 {
            let forced = trail.output_masks[round - 2]
                .xor(&trail.input_masks[round - 1])
                .unwrap();
            assert_eq!(trail.output_masks[round], forced);
        }

        // The reported bias is the piling-up value of the round biases
        let recombined = 0.5
            * trail
                .round_biases
                .iter()
                .map(|b| 2.0 * b)
                .product::<f64>();
        assert_eq!(trail.bias, recombined.abs());
    }

    #[test]
    fn observer_sees_progress() {
        let net = zero_key_network();
        let search = TrailSearch::new(&net, 2).unwrap();
        let mut observer = CountingObserver {
            extensions: 0,
            improvements: 0,
        };

        let trail = search.search(&mut observer).unwrap();
        assert!(observer.improvements >= 1);
        assert!(observer.extensions >= observer.improvements);
        assert_eq!(trail.bias, 0.5);
    }

    #[test]
    fn round_count_validation() {
        let net = zero_key_network();
        assert!(TrailSearch::new(&net, 0).is_err());
        assert!(TrailSearch::new(&net, 3).is_err());
    }

    #[test]
    fn cancellation_stops_search() {
        let net = zero_key_network();
        let token = CancelToken::new();
        let search = TrailSearch::new(&net, 2).unwrap().with_cancel(token.clone());

        token.cancel();
        assert_eq!(
            search.search(&mut NullObserver).unwrap_err(),
            Error::Cancelled
        );
    }
}
