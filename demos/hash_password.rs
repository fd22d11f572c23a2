use std::env;

use backoffice::auth::password::{hash_password, verify_password};

fn main() -> anyhow::Result<()> {
    let Some(password) = env::args().nth(1) else {
        eprintln!("Usage: cargo run --example hash_password <password>");
        std::process::exit(1);
    };
    let hash = hash_password(&password)?;
    debug_assert!(verify_password(&password, &hash)?);
    println!("{hash}");
    Ok(())
}
