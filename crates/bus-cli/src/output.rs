//! Plain-text output helpers, kept deliberately free of a table-formatting
//! dependency the rest of this small CLI doesn't otherwise need.

pub fn heading(text: &str) {
    println!("{text}");
    println!("{}", "-".repeat(text.len()));
}

pub fn row(label: &str, value: impl std::fmt::Display) {
    println!("{label:<20} {value}");
}

pub fn empty(message: &str) {
    println!("({message})");
}
