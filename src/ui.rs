use std::time::Duration;

use console::{style, StyledObject, Term};
use indicatif::{ProgressBar, ProgressStyle};

const RULE_MAX: usize = 52;
const BOX_MIN_INNER: usize = 46;

fn rule() -> String {
    let width = Term::stdout().size().1.max(60) as usize;
    "─".repeat(width.min(RULE_MAX))
}

// ── Banner ────────────────────────────────────────────────────────────────────

pub fn print_banner() {
    let _ = Term::stdout().clear_screen();

    const LOGO: [&str; 6] = [
        r"    █████╗ ██████╗  ██████╗██╗  ██╗",
        r"   ██╔══██╗██╔══██╗██╔════╝██║  ██║",
        r"   ███████║██████╔╝██║     ███████║",
        r"   ██╔══██║██╔══██╗██║     ██╔══██║",
        r"   ██║  ██║██║  ██║╚██████╗██║  ██║",
        r"   ╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝╚═╝  ╚═╝",
    ];

    println!();
    LOGO.iter().for_each(|l| println!("{}", style(l).cyan().bold()));
    let tagline = format!(
        "   Guided installer · one disk, UEFI, GPT · v{}",
        env!("CARGO_PKG_VERSION")
    );
    println!("\n{}\n", style(tagline).dim().italic());
    println!("{}\n", style(rule()).dim());
}

// ── Headings ──────────────────────────────────────────────────────────────────

/// Numbered pipeline stage header, e.g. ` 3/6   Mounting`.
pub fn print_step(step: usize, total: usize, title: &str) {
    let tag = style(format!(" {step}/{total} ")).black().on_cyan().bold();
    println!("\n{}  {}", tag, style(title).white().bold());
    println!("{}", style(rule()).dim());
}

/// Section heading used inside the menu.
pub fn print_section(title: &str) {
    println!("\n  {}", style(title).white().bold().underlined());
}

// ── Status lines ──────────────────────────────────────────────────────────────

fn status(mark: StyledObject<&str>, msg: impl std::fmt::Display) {
    println!("  {mark}  {msg}");
}

pub fn print_success(msg: &str) {
    status(style("✓").green().bold(), style(msg).green());
}

pub fn print_info(msg: &str) {
    status(style("→").blue().bold(), msg);
}

pub fn print_warning(msg: &str) {
    status(style("⚠").yellow().bold(), style(msg).yellow());
}

/// Goes to stderr, unlike the other status lines.
pub fn print_error(msg: &str) {
    eprintln!("  {}  {}", style("✗").red().bold(), style(msg).red());
}

/// A command that dry-run mode reported instead of running.
pub fn print_dry_run(cmd: &str) {
    status(style("$").magenta().bold(), style(cmd).dim());
}

// ── Key/value box ─────────────────────────────────────────────────────────────

/// Bordered key/value listing, used for the review screen and the install
/// summary:
///
/// ```text
/// ┌─ Partition layout ─────────────────────────┐
/// │  EFI    1 – 1025 MiB  fat32
/// │  ROOT   1025 – 21505 MiB  ext4
/// └────────────────────────────────────────────┘
/// ```
pub fn print_kv_box<K: AsRef<str>, V: AsRef<str>>(title: &str, rows: &[(K, V)]) {
    let key_width = rows
        .iter()
        .map(|(k, _)| k.as_ref().chars().count())
        .max()
        .unwrap_or(0)
        + 2;
    let inner = rows
        .iter()
        .map(|(_, v)| key_width + v.as_ref().chars().count() + 2)
        .max()
        .unwrap_or(0)
        .max(BOX_MIN_INNER);

    let dashes = "─".repeat(inner.saturating_sub(title.chars().count() + 2));
    println!("  ┌─ {} {}┐", style(title).white().bold(), style(dashes).dim());
    for (key, val) in rows {
        println!(
            "  │  {}{}",
            style(format!("{:<key_width$}", key.as_ref())).dim(),
            style(val.as_ref()).white().bold()
        );
    }
    println!("  └{}┘", style("─".repeat(inner + 2)).dim());
}

// ── Spinner ───────────────────────────────────────────────────────────────────

/// Braille spinner shown while a silent command runs; the caller clears it
/// with `finish_and_clear()`.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let template = ProgressStyle::with_template("  {spinner:.cyan.bold}  {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");
    let pb = ProgressBar::new_spinner().with_style(template).with_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
