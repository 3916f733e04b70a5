use console::{Emoji, style};

pub static OK_ICON: Emoji<'_, '_> = Emoji("✅ ", "+ ");
pub static FAIL_ICON: Emoji<'_, '_> = Emoji("❌ ", "x ");
pub static BOOK: Emoji<'_, '_> = Emoji("📖 ", "");

pub fn print_ok(msg: &str) {
    println!("{} {}", OK_ICON, style(msg).green());
}

pub fn print_failure(msg: &str) {
    println!("{} {}", FAIL_ICON, style(msg).red());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", FAIL_ICON, style(msg).red().bold());
}

pub fn print_heading(msg: &str) {
    println!("{} {}", BOOK, style(msg).bold());
}

pub fn print_field(label: &str, value: &str) {
    println!("    {}: {}", style(label).cyan(), value);
}
