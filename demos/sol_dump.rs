//! SOL dump - Prints the contents of a Flash shared object file
//!
//! Run with: cargo run --example sol_dump -- path/to/file.sol
//!
//! Files that do not start with a SOL header are decoded as a single bare
//! AMF3 value instead. Set `RUST_LOG=amf3_sol=trace` to see every entry as
//! it is decoded.

use std::fs;

use amf3_sol::{sol, Amf3Decoder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("amf3_sol=debug".parse()?)
                .add_directive("sol_dump=info".parse()?),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: sol_dump <file>");
        eprintln!("Example: sol_dump ~/.macromedia/Flash_Player/#SharedObjects/game.sol");
        std::process::exit(1);
    });

    let data = fs::read(&path)?;
    let decoder = Amf3Decoder::new();

    if sol::is_sol(&data) {
        let file = decoder.decode_file(&data)?;
        println!("{} ({} entries)", file.name, file.len());
        for (key, value) in file.iter() {
            println!("  {} = {}", key, file.arena.display(value));
        }
    } else {
        tracing::info!(path = %path, "No SOL header, decoding as a bare value");
        let doc = decoder.decode(&data)?;
        println!("{}", doc);
    }

    Ok(())
}
