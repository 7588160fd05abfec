use std::env;

use atty::Stream;
use chrono::{DateTime, Local};
use owo_colors::OwoColorize;

use crate::config::Settings;

/// Полный баннер с информацией о брокере.
pub const ASCII_FULL: &str = r#"
    Zumq {version}
    ----------------------------------------------
    Mode:             {mode}
    Listening:        {listen}
    Credit:           {credit}
    Queues:           {provisioning} ({queues} preconfigured)
    Overflow:         {overflow}
    PID:              {pid}
    OS/Arch:          {os}/{arch}
    Build:            {git} ({build_time})
"#;

/// Компактный баннер.
pub const ASCII_COMPACT: &str = r#"
Zumq {version} - {mode} - {listen} - credit {credit} - PID {pid}
"#;

/// Заполняет шаблон баннера.
pub fn render_banner(
    template: &str,
    listen: &str,
    settings: &Settings,
) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let bits = std::mem::size_of::<usize>() * 8;
    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let git = option_env!("GIT_COMMIT").unwrap_or("unknown");
    let build_time_raw = option_env!("BUILD_TIME").unwrap_or("unknown");
    let build_time = match DateTime::parse_from_rfc3339(build_time_raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Err(_) => build_time_raw.to_string(),
    };

    template
        .replace("{version}", &format!("{version} ({bits}-bit)"))
        .replace("{mode}", mode)
        .replace("{listen}", listen)
        .replace("{credit}", &settings.credit.to_string())
        .replace("{provisioning}", settings.provisioning.as_str())
        .replace("{queues}", &settings.queues.len().to_string())
        .replace("{overflow}", settings.overflow_policy.as_str())
        .replace("{pid}", &std::process::id().to_string())
        .replace("{os}", env::consts::OS)
        .replace("{arch}", env::consts::ARCH)
        .replace("{git}", git)
        .replace("{build_time}", &build_time)
}

/// Печатает баннер после того, как слушатель привязан.
///
/// `ZUMQ_BANNER=full|compact` переопределяет выбор; по умолчанию полный в
/// debug-сборке и компактный в release.
pub fn print_banner(
    listen: &str,
    settings: &Settings,
) {
    let full = match env::var("ZUMQ_BANNER").ok().as_deref() {
        Some("full") => true,
        Some("compact") => false,
        _ => cfg!(debug_assertions),
    };
    let color = atty::is(Stream::Stdout);

    if full {
        let s = render_banner(ASCII_FULL, listen, settings);
        if color {
            for (i, line) in s.lines().enumerate() {
                let trimmed = line.trim_start();
                if i == 1 {
                    println!("{}", line.bold().bright_blue());
                } else if trimmed.starts_with("Listening:") || trimmed.starts_with("Credit:") {
                    println!("{}", line.magenta());
                } else if trimmed.starts_with("Build:") {
                    println!("{}", line.dimmed());
                } else {
                    println!("{line}");
                }
            }
        } else {
            println!("{s}");
        }
    } else {
        let s = render_banner(ASCII_COMPACT, listen, settings);
        if color {
            println!("{}", s.bold().green());
        } else {
            println!("{s}");
        }
    }
    println!();
}

/// Строка готовности с меткой времени до миллисекунд.
pub fn print_startup_log() {
    let pid = std::process::id();
    let ts = Local::now().format("%d %b %Y %H:%M:%S%.3f");

    if atty::is(Stream::Stdout) {
        println!(
            "[{}] {} {}",
            pid.to_string().red(),
            ts.to_string().white(),
            "* Ready to accept connections".green()
        );
    } else {
        println!("[{pid}] {ts} * Ready to accept connections");
    }
}
