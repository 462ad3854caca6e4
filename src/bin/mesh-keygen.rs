#![forbid(unsafe_code)]
//! Generates a node key pair and prints it in config-ready form.

use meshchain::crypto::KeyPair;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let keypair = KeyPair::generate()?;

    println!("# add to config.toml under [keys]");
    println!("secret_key_hex = \"{}\"", hex::encode(keypair.secret_key.secret_bytes()));
    println!();
    println!("# public address");
    println!("# {}", keypair.address());
    Ok(())
}
