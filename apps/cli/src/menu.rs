//! Interactive menu shown when no subcommand is given.

use std::io::{BufRead, Write};

use chrono::Local;
use color_eyre::eyre::{Result, eyre};

use mvpfactory_shared::AppConfig;
use mvpfactory_storage::ActiveCheckpoint;

use crate::commands;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Resume,
    NewBuild,
    Upgrade,
    Restart,
    Quit,
}

pub(crate) async fn run(config: &AppConfig) -> Result<()> {
    let active = commands::checkpoint_manager(config).list_active()?;

    println!("{}", "=".repeat(60));
    println!("MVP Factory: idea to MVP pipeline");
    println!("{}", "=".repeat(60));

    let mut options = Vec::new();
    if !active.is_empty() {
        println!();
        println!("Unfinished runs:");
        for line in checkpoint_lines(&active) {
            println!("{line}");
        }
        options.push((Choice::Resume, "Resume an unfinished run"));
    }
    options.push((Choice::NewBuild, "New build"));
    options.push((Choice::Upgrade, "Upgrade an existing project"));
    if !active.is_empty() {
        options.push((Choice::Restart, "Delete a checkpoint and start over"));
    }
    options.push((Choice::Quit, "Quit"));

    println!();
    for (index, (_, label)) in options.iter().enumerate() {
        println!("  {}. {label}", index + 1);
    }

    let picked = ask("Choose")?;
    let choice = picked
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .map(|(choice, _)| *choice)
        .ok_or_else(|| eyre!("'{picked}' is not one of the listed options"))?;

    match choice {
        Choice::Resume => {
            let checkpoint = pick_checkpoint(active)?;
            commands::resume_checkpoint(config, checkpoint).await
        }
        Choice::NewBuild => {
            let idea = ask("Idea to build")?;
            commands::cmd_new(config, &idea).await
        }
        Choice::Upgrade => {
            let project = ask("Project name (directory under the output root)")?;
            let request = ask("What should be added or changed")?;
            commands::cmd_upgrade(config, &project, &request).await
        }
        Choice::Restart => {
            let checkpoint = pick_checkpoint(active)?;
            commands::restart_checkpoint(config, checkpoint).await
        }
        Choice::Quit => Ok(()),
    }
}

/// One numbered line per checkpoint.
pub(crate) fn checkpoint_lines(active: &[ActiveCheckpoint]) -> Vec<String> {
    active
        .iter()
        .enumerate()
        .map(|(index, checkpoint)| {
            let phase = checkpoint.record.phase_completed;
            format!(
                "  [{}] {:<24} {:<14} {}  ({})",
                index + 1,
                checkpoint.handle.identity(),
                phase.label(),
                checkpoint
                    .record
                    .timestamp
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M"),
                phase.resume_hint()
            )
        })
        .collect()
}

fn pick_checkpoint(mut active: Vec<ActiveCheckpoint>) -> Result<ActiveCheckpoint> {
    if active.len() == 1 {
        return Ok(active.remove(0));
    }
    let picked = ask(&format!("Checkpoint number (1-{})", active.len()))?;
    let index = picked
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .filter(|i| *i < active.len())
        .ok_or_else(|| eyre!("'{picked}' is not a listed checkpoint"))?;
    Ok(active.swap_remove(index))
}

/// Prompt on stdout and read one trimmed line from stdin.
pub(crate) fn ask(prompt: &str) -> Result<String> {
    print!("{prompt}: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(eyre!("no input (stdin closed)"));
    }
    Ok(line.trim().to_string())
}
