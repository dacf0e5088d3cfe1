//! Print an Argon2id hash for seeding a storefront user by hand
//!
//! Usage:
//!   hash-password                  (reads the password from stdin)
//!   hash-password "correct horse battery"

use std::env;
use std::io::{self, Write};
use storefront_api::auth::{hash_password, validate_password};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let password = match env::args().nth(1) {
        Some(password) => password,
        None => {
            print!("Password: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if let Err(e) = validate_password(&password) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let hash = hash_password(&password)?;

    println!("{hash}");
    eprintln!("INSERT INTO users (first_name, last_name, email, password_hash) VALUES ('Admin', 'User', 'admin@example.com', '{hash}');");
    Ok(())
}
