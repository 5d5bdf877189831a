use structopt::StructOpt;

#[derive(Clone, StructOpt)]
#[structopt(
    name = "matsui",
    about = "Linear cryptanalysis of DES-style Feistel networks."
)]
pub enum MatsuiOptions {
    #[structopt(name = "lat")]
    Lat {
        #[structopt(short = "c", long = "cipher")]
        /**
        Name of the network to analyse. Currently available: des, toy
        */
        cipher: String,

        #[structopt(short = "s", long = "sbox", default_value = "0")]
        /**
        Index of the S-box whose approximation table to print.
        */
        sbox: usize,

        #[structopt(short = "n", long = "count", default_value = "10")]
        /**
        Number of highest-bias entries to print.
        */
        count: usize,
    },

    #[structopt(name = "trail")]
    Trail {
        #[structopt(short = "c", long = "cipher")]
        /**
        Name of the network to analyse. Currently available: des, toy
        */
        cipher: String,

        #[structopt(short = "r", long = "rounds")]
        /**
        The number of rounds to cover with the trail.
        */
        rounds: usize,
    },

    #[structopt(name = "attack1")]
    Attack1 {
        #[structopt(short = "p", long = "pairs", default_value = "4096")]
        /**
        Number of plaintext/ciphertext pairs to sample. Accuracy grows
        with the pair count relative to 1 / bias^2.
        */
        pairs: usize,

        #[structopt(short = "s", long = "seed", default_value = "0")]
        /**
        Seed for the key and plaintext sampling, for reproducible runs.
        */
        seed: u64,
    },
}
