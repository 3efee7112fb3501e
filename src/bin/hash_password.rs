/*!
Print the Argon2 PHC string for a password, for use as `admin_password`
(or in the `admins` table) with `admin_password_scheme = "argon2"`.

```bash
hash_password 'hostel@123'
```

With no argument, the password is read from the first line of stdin.
*/
use std::io::BufRead;

fn main() {
    let password = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            let mut line = String::new();
            if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
                eprintln!("Error reading password from stdin: {}", &e);
                std::process::exit(1);
            }
            line.trim_end_matches(&['\r', '\n'][..]).to_owned()
        },
    };

    if password.is_empty() {
        eprintln!("Refusing to hash an empty password.");
        std::process::exit(2);
    }

    match leavex::auth::hash_password(&password) {
        Ok(phc) => println!("{}", &phc),
        Err(e) => {
            eprintln!("{}", &e);
            std::process::exit(1);
        },
    }
}
