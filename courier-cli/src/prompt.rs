//! Interactive questions asked when a flag was left out.

use anyhow::{bail, Result};
use courier::adb::AdbDevice;
use courier::targets::Selection;
use dialoguer::{Confirm, Input, Select};
use std::io::IsTerminal;

/// Prompts only make sense with a person at both ends of the terminal.
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

pub fn choose_device(devices: &[AdbDevice]) -> Result<String> {
    let items: Vec<String> = devices
        .iter()
        .map(|d| format!("{} - {} ({})", d.udid, d.model, d.product))
        .collect();
    let selection = Select::new()
        .with_prompt("Several devices are connected, pick one")
        .items(&items)
        .default(0)
        .interact()?;
    Ok(devices[selection].udid.clone())
}

pub fn choose_profile(names: &[String], current: &str) -> Result<String> {
    let default = names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(current))
        .unwrap_or(0);
    let selection = Select::new()
        .with_prompt("Device profile")
        .items(names)
        .default(default)
        .interact()?;
    Ok(names[selection].clone())
}

fn position(prompt: &str, total: usize, min: usize) -> Result<usize> {
    let value: usize = Input::new()
        .with_prompt(format!("{prompt} ({min}-{total})"))
        .validate_with(move |n: &usize| -> Result<(), String> {
            if (min..=total).contains(n) {
                Ok(())
            } else {
                Err(format!("enter a number from {min} to {total}"))
            }
        })
        .interact_text()?;
    Ok(value)
}

pub fn choose_selection(total: usize) -> Result<Selection> {
    if total == 0 {
        bail!("the chat list is empty");
    }
    let items = [
        "All chats",
        "Start from a position",
        "A range of positions",
        "The first N chats",
    ];
    let choice = Select::new()
        .with_prompt("Which chats should get the message?")
        .items(&items)
        .default(0)
        .interact()?;
    Ok(match choice {
        1 => Selection::StartFrom(position("Start from", total, 1)?),
        2 => {
            let start = position("From", total, 1)?;
            let end = position("To", total, start)?;
            Selection::Range(start, end)
        }
        3 => Selection::FirstN(position("How many", total, 1)?),
        _ => Selection::All,
    })
}

pub fn confirm(question: &str) -> Result<bool> {
    Ok(Confirm::new()
        .with_prompt(question)
        .default(true)
        .interact()?)
}
