//! Hash a password for seeding accounts by hand, e.g. the first admin:
//!   cargo run --bin hashpass -- <password>
//! then INSERT the printed PHC string into account.password_hash.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};

fn main() {
    let Some(password) = std::env::args().nth(1) else {
        eprintln!("Usage: hashpass <password>");
        std::process::exit(2);
    };
    if password.len() < 8 {
        eprintln!("refusing to hash a password shorter than 8 characters");
        std::process::exit(1);
    }
    let salt = SaltString::generate(&mut OsRng);
    match Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(phc) => println!("{phc}"),
        Err(e) => {
            eprintln!("hash error: {e}");
            std::process::exit(1);
        }
    }
}
