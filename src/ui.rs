//! Operator-facing status lines.
//!
//! Three severities, each with its own marker so they can be told apart when
//! the output is scrolled back or piped into a log. Errors go to stderr.

pub fn info(message: impl AsRef<str>) {
    println!("[*] {}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    println!("[!] {}", message.as_ref());
}

pub fn error(message: impl AsRef<str>) {
    eprintln!("[x] {}", message.as_ref());
}

pub fn step(index: usize, total: usize, title: &str) {
    info(format!("({}/{}) {}", index, total, title));
}

pub fn block(text: &str) {
    println!();
    println!("{}", text);
}
