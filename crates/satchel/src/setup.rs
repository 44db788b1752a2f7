//! The `setup` command: keystore initialization, credential encryption,
//! and registration of the periodic check trigger.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use miette::{IntoDiagnostic, Result, miette};

use satchel_config::DEFAULT_KEY_ALIAS;

/// Period between check invocations registered with the device job
/// scheduler (15 minutes).
const CHECK_PERIOD_MS: u64 = 900_000;

const CHECK_SCRIPT: &str = "#!/bin/sh\nexec satchel check\n";

pub fn cmd_setup(secrets_file: Option<PathBuf>, force: bool) -> Result<()> {
    println!("Setting up satchel...");

    // Generate the device signing key if needed.
    if satchel_keystore::key_exists(DEFAULT_KEY_ALIAS) {
        println!("Signing key '{DEFAULT_KEY_ALIAS}' already exists.");
    } else {
        println!("Generating signing key '{DEFAULT_KEY_ALIAS}' in the device keystore...");
        satchel_keystore::generate_key(DEFAULT_KEY_ALIAS).into_diagnostic()?;
        println!("  Key generated successfully.");
    }

    let secrets_file = secrets_file.unwrap_or_else(satchel_config::default_secrets_path);
    if secrets_file.exists() && !force {
        return Err(miette!(
            "secrets file already exists: {}\nUse --force to overwrite.",
            secrets_file.display()
        ));
    }

    // Prompt for credentials; the application key never echoes.
    println!();
    println!("Enter your object storage credentials:");
    print!("  Key ID: ");
    std::io::stdout().flush().into_diagnostic()?;
    let mut key_id = String::new();
    std::io::stdin().read_line(&mut key_id).into_diagnostic()?;
    let key_id = key_id.trim().to_string();

    print!("  Application Key: ");
    std::io::stdout().flush().into_diagnostic()?;
    let app_key = rpassword::read_password().into_diagnostic()?;
    let app_key = app_key.trim().to_string();

    if key_id.is_empty() || app_key.is_empty() {
        return Err(miette!("both Key ID and Application Key are required"));
    }

    if let Some(parent) = secrets_file.parent() {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }

    println!("Encrypting secrets to {}...", secrets_file.display());
    let secrets = satchel_keystore::secrets_payload(&key_id, &app_key);
    satchel_keystore::encrypt_secrets(&secrets, &secrets_file, DEFAULT_KEY_ALIAS)
        .into_diagnostic()?;
    println!("  Secrets encrypted successfully.");

    println!();
    println!("Setting up scheduler...");

    let state_dir = satchel_scheduler::default_state_dir().into_diagnostic()?;
    std::fs::create_dir_all(&state_dir).into_diagnostic()?;
    println!("  Created state directory: {}", state_dir.display());

    // The check script is what the device job scheduler invokes.
    let script_path = state_dir
        .parent()
        .map(|p| p.join("check-schedule.sh"))
        .unwrap_or_else(|| state_dir.join("check-schedule.sh"));
    std::fs::write(&script_path, CHECK_SCRIPT).into_diagnostic()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))
            .into_diagnostic()?;
    }
    println!("  Created check script: {}", script_path.display());

    register_job_scheduler(&script_path);

    println!();
    println!("Setup complete! You can now:");
    println!("  - Run syncs manually: satchel run --all --dry-run");
    println!("  - Check schedule status: satchel status");
    Ok(())
}

/// Best-effort registration with the device job scheduler; a missing tool
/// only downgrades to manual scheduling.
fn register_job_scheduler(script_path: &std::path::Path) {
    println!("  Registering with termux-job-scheduler...");

    let result = Command::new("termux-job-scheduler")
        .arg("schedule")
        .arg("--script")
        .arg(script_path)
        .arg("--period-ms")
        .arg(CHECK_PERIOD_MS.to_string())
        .arg("--persisted")
        .arg("true")
        .output();

    match result {
        Ok(output) if output.status.success() => {
            println!("  Job scheduler registered successfully.");
        }
        Ok(output) => {
            eprintln!(
                "  Warning: failed to register job scheduler: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            eprintln!("  Manual scheduling will still work.");
        }
        Err(_) => {
            eprintln!("  Warning: termux-job-scheduler not found.");
            eprintln!("  Install the termux-api package to enable automatic scheduling.");
            eprintln!("  Manual scheduling will still work.");
        }
    }
}
