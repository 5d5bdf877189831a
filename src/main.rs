mod options;

use rand::rngs::StdRng;
use rand::SeedableRng;
use structopt::StructOpt;

use matsui::attack::LinearAttacker;
use matsui::bitvector::BitVector;
use matsui::cipher::{des, toy};
use matsui::error::Result;
use matsui::feistel::Feistel;
use matsui::sbox::LatEntry;
use matsui::trail::{LinearTrail, TrailObserver, TrailSearch};

use options::MatsuiOptions;

/// Prints every incumbent replacement as the search tightens its bound.
struct PrintObserver;

impl TrailObserver for PrintObserver {
    fn on_improvement(&mut self, trail: &LinearTrail) {
        println!("improved: bias {:.6e}", trail.bias);
    }
}

fn name_to_network(name: &str) -> Option<Result<Feistel>> {
    match name {
        "des" => Some(BitVector::new(des::KEY_SIZE).and_then(des::network)),
        "toy" => Some(BitVector::new(8).and_then(toy::network)),
        _ => None,
    }
}

fn print_lat(cipher: &str, sbox: usize, count: usize) -> Result<()> {
    let network = match name_to_network(cipher) {
        Some(network) => network?,
        None => {
            println!("Network not supported. Check --help for supported networks.");
            return Ok(());
        }
    };

    if sbox >= network.num_sboxes() {
        println!(
            "S-box index out of range; the network has {} S-boxes.",
            network.num_sboxes()
        );
        return Ok(());
    }

    let scale = (1u64 << network.sbox_in()) as f64;
    for &LatEntry {
        input,
        output,
        bias,
    } in network.sbox(sbox).top(count)
    {
        println!(
            "input {:#4x}  output {:#4x}  bias {:6.1}  ({:+.6})",
            input,
            output,
            bias,
            bias / scale
        );
    }

    Ok(())
}

fn find_trail(cipher: &str, rounds: usize) -> Result<()> {
    let network = match name_to_network(cipher) {
        Some(network) => network?,
        None => {
            println!("Network not supported. Check --help for supported networks.");
            return Ok(());
        }
    };

    let search = TrailSearch::new(&network, rounds)?;
    let trail = search.search(&mut PrintObserver)?;

    println!("best {}-round trail, bias {:.6e}", rounds, trail.bias);
    for round in 0..rounds {
        println!(
            "round {:2}: input {}  output {}  bias {:+.6}",
            round, trail.input_masks[round], trail.output_masks[round], trail.round_biases[round]
        );
    }

    Ok(())
}

/// Runs Algorithm 1 against three-round DES with Matsui's five-bit
/// approximation, then compares the recovered parity with the key.
fn run_attack_1(pairs: usize, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let key = des::random_key(&mut rng)?;
    let network = des::network(key.clone())?;

    let (input_mask, output_mask) = des::matsui_masks()?;
    let attacker = LinearAttacker::new(&network, 3)?;

    let parity = attacker.attack_1(
        &mut rng,
        pairs,
        &input_mask,
        &output_mask,
        des::MATSUI_THREE_ROUND_BIAS,
        network.initial_permutation(),
        network.final_permutation(),
    )?;

    // The approximation's right-hand side covers one key bit from each of
    // the two outer rounds
    let k1 = network.key_selection(0)?[25];
    let k2 = network.key_selection(2)?[25];
    let actual = key.get_bit(k1)? ^ key.get_bit(k2)?;

    println!("recovered parity: {}", parity);
    println!(
        "actual parity:    {} (key bits {} and {})",
        u8::from(actual),
        k1,
        k2
    );

    Ok(())
}

fn main() {
    let outcome = match MatsuiOptions::from_args() {
        MatsuiOptions::Lat {
            cipher,
            sbox,
            count,
        } => print_lat(&cipher, sbox, count),
        MatsuiOptions::Trail { cipher, rounds } => find_trail(&cipher, rounds),
        MatsuiOptions::Attack1 { pairs, seed } => run_attack_1(pairs, seed),
    };

    if let Err(error) = outcome {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}
