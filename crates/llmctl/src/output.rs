//! Output formatting - plain ASCII terminal output

use llm_common::{
    ErrorResponse, HealthResponse, LifecycleResponse, ServiceName, ServiceState, ServiceStatus,
    ServicesStatusResponse,
};
use owo_colors::OwoColorize;

fn state_label(state: ServiceState) -> String {
    let label = format!("{:<8}", state);
    match state {
        ServiceState::Running => label.bright_green().to_string(),
        ServiceState::Stopped => label.bright_red().to_string(),
        ServiceState::Unknown => label.yellow().to_string(),
    }
}

fn pid_label(pid: Option<u32>) -> String {
    pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn status_line(name: ServiceName, status: &ServiceStatus) -> String {
    let mut line = format!(
        "{:<8} {} pid {:<8} port {:<6} health {:<4} {}",
        name.to_string(),
        state_label(status.status),
        pid_label(status.pid),
        status.port,
        if status.healthy { "ok" } else { "fail" },
        status.endpoint.dimmed()
    );
    if let Some(op) = status.operation {
        line.push_str(&format!("  [{}]", op.phase().cyan()));
    }
    line
}

pub fn print_status(name: ServiceName, status: &ServiceStatus) {
    println!("{}", status_line(name, status));
}

pub fn print_statuses(statuses: &ServicesStatusResponse) {
    for (name, status) in statuses {
        print_status(*name, status);
    }
}

pub fn print_health(health: &HealthResponse) {
    println!(
        "{} llmd v{} (up {}s)",
        "[OK]".bright_green(),
        health.version,
        health.uptime_seconds
    );
    for (name, snapshot) in &health.services {
        let checked = snapshot
            .last_checked
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<8} {} pid {:<8} checked {}",
            name.to_string(),
            state_label(snapshot.status),
            pid_label(snapshot.pid),
            checked
        );
    }
}

pub fn print_lifecycle(response: &LifecycleResponse) {
    println!("{} {}", "[OK]".bright_green(), response.message);
    println!(
        "  pid {}  endpoint {}",
        pid_label(response.pid),
        response.endpoint
    );
    if let Some(block) = script_output_block("stdout", &response.stdout) {
        println!("{}", block);
    }
}

pub fn print_error(err: &ErrorResponse) {
    eprintln!("{} {}", "[FAIL]".bright_red(), err.error);
    eprintln!("  kind: {}", err.kind.as_str());
    if let Some(code) = err.exit_code {
        eprintln!("  exit code: {}", code);
    }
    let captured = [("stdout", &err.stdout), ("stderr", &err.stderr)];
    for (label, text) in captured {
        if let Some(block) = text.as_deref().and_then(|t| script_output_block(label, t)) {
            eprintln!("{}", block);
        }
    }
}

/// Indented block of script output, None when there is nothing to show
pub fn script_output_block(label: &str, text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let mut block = format!("  {}:", label.dimmed());
    for line in text.lines() {
        block.push_str("\n    ");
        block.push_str(line);
    }
    Some(block)
}
