// Terminal UI utilities

use std::time::Duration;

use colored::Colorize;
use console::Term;
use indicatif::{ProgressBar, ProgressStyle};

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}",
        "╔════════════════════════════════════════════════════════════╗".bright_blue()
    );
    println!("{}", format!("║  {:<58}║", title).bright_blue());
    println!(
        "{}",
        "╚════════════════════════════════════════════════════════════╝".bright_blue()
    );
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// One aligned `label: value` row
pub fn print_field(label: &str, value: impl std::fmt::Display) {
    println!("{:<11}{}", format!("{label}:").bold(), value);
}

/// Steady-ticking spinner; call `finish_and_clear` when done
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Ask a yes/no question on the terminal; anything but y/yes is no
pub fn confirm(question: &str) -> std::io::Result<bool> {
    let term = Term::stderr();
    term.write_str(&format!("{} {} ", question, "[y/N]:".dimmed()))?;
    let answer = term.read_line()?;
    Ok(is_yes(&answer))
}

/// Prompt for a line of text, returning `default` on an empty answer
pub fn prompt(label: &str, default: Option<&str>) -> std::io::Result<String> {
    let term = Term::stderr();
    match default {
        Some(default) => term.write_str(&format!("{label} [{default}]: "))?,
        None => term.write_str(&format!("{label}: "))?,
    }
    let answer = term.read_line()?.trim().to_string();
    Ok(match default {
        Some(default) if answer.is_empty() => default.to_string(),
        _ => answer,
    })
}

/// Prompt for a secret without echoing it
pub fn prompt_secret(label: &str) -> std::io::Result<String> {
    let term = Term::stderr();
    term.write_str(&format!("{label}: "))?;
    Ok(term.read_secure_line()?.trim().to_string())
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
