//! Human-readable error descriptions and structured JSON error formatting.

use probe_core::{BuildError, ProbeTestError, SessionAbort};

/// The typed session error behind a report, whether bare or inside a `SessionAbort`.
fn session_error(err: &eyre::Report) -> Option<&ProbeTestError> {
    if let Some(abort) = err.downcast_ref::<SessionAbort>() {
        return Some(&abort.error);
    }
    err.downcast_ref::<ProbeTestError>()
}

fn partial_note(err: &eyre::Report) -> String {
    match err.downcast_ref::<SessionAbort>() {
        Some(a) => format!(
            "\nPartial results: {} of {} units completed, {} failed.",
            a.partial.completed.len(),
            a.partial.planned,
            a.partial.failed_count()
        ),
        None => String::new(),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingProbe => {
                "What happened: No probe client was provided to the session.\nLikely causes: The probe backend failed to initialize or was not wired into the builder.\nHow to fix: Ensure the backend is created successfully and passed via with_probe(...).".to_string()
            }
            BuildError::MissingPlan => {
                "What happened: No test plan was provided to the session.\nLikely causes: The plan was not built before the session.\nHow to fix: Build a TestPlan from the config and pass it via with_plan(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or on the command line.\nHow to fix: Edit the config file or flags, then rerun."
            ),
        };
    }

    if let Some(pe) = session_error(err) {
        let partial = partial_note(err);
        return match pe {
            ProbeTestError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Zero sample counts, an empty speed sweep, missing bed geometry, or a non-positive threshold.\nHow to fix: Edit the [tests], [bed] or [stats] section, or the matching flags, then rerun."
            ),
            ProbeTestError::Transport(msg) => format!(
                "What happened: Lost contact with the printer ({msg}).\nLikely causes: Firmware shut down, host service restarted, or the connection dropped.\nHow to fix: Check the printer is online and responsive, then start a new run.{partial}"
            ),
            ProbeTestError::Aborted => format!(
                "What happened: The session was aborted by the user.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Start a new run when ready.{partial}"
            ),
            ProbeTestError::ProbeFailure(msg) => format!(
                "What happened: Probe failure ({msg}).\nLikely causes: Sample tolerance exceeded or the probe did not trigger.\nHow to fix: Check the probe mount and nozzle, then rerun.{partial}"
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("csv") || lower.contains("output dir") {
        return format!(
            "What happened: Could not write the CSV export ({msg}).\nLikely causes: Output folder missing, read-only or full.\nHow to fix: Pass a writable folder with --output-dir or set report.output_dir."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_TRANSPORT: i32 = 3;
pub const EXIT_ABORTED: i32 = 4;

/// Stable exit codes: config 2, transport 3, user abort 4, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return EXIT_CONFIG;
    }
    match session_error(err) {
        Some(ProbeTestError::Config(_)) => EXIT_CONFIG,
        Some(ProbeTestError::Transport(_)) => EXIT_TRANSPORT,
        Some(ProbeTestError::Aborted) => EXIT_ABORTED,
        Some(ProbeTestError::ProbeFailure(_)) | None => EXIT_GENERIC,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    match session_error(err) {
        Some(ProbeTestError::Config(_)) => "Config",
        Some(ProbeTestError::Transport(_)) => "Transport",
        Some(ProbeTestError::Aborted) => "Aborted",
        Some(ProbeTestError::ProbeFailure(_)) => "ProbeFailure",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = reason_name(err);
    let msg = humanize(err);
    if let Some(a) = err.downcast_ref::<SessionAbort>() {
        return json!({
            "reason": reason,
            "message": msg,
            "details": {
                "planned": a.partial.planned,
                "completed": a.partial.completed.len(),
                "failed": a.partial.failed_count(),
                "not_run": a.partial.not_run(),
            },
        })
        .to_string();
    }
    json!({ "reason": reason, "message": msg }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_core::SessionReport;

    fn abort(error: ProbeTestError) -> eyre::Report {
        eyre::Report::new(SessionAbort {
            error,
            partial: SessionReport {
                planned: 4,
                ..SessionReport::default()
            },
        })
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let config = eyre::Report::new(ProbeTestError::Config("x".into()));
        assert_eq!(exit_code_for_error(&config), EXIT_CONFIG);
        assert_eq!(
            exit_code_for_error(&abort(ProbeTestError::Transport("down".into()))),
            EXIT_TRANSPORT
        );
        assert_eq!(exit_code_for_error(&abort(ProbeTestError::Aborted)), EXIT_ABORTED);
        assert_eq!(exit_code_for_error(&eyre::eyre!("boom")), EXIT_GENERIC);
        assert_eq!(
            exit_code_for_error(&eyre::Report::new(BuildError::MissingPlan)),
            EXIT_CONFIG
        );
    }

    #[test]
    fn transport_message_mentions_partial_results() {
        let msg = humanize(&abort(ProbeTestError::Transport("link down".into())));
        assert!(msg.starts_with("What happened: Lost contact"));
        assert!(msg.contains("0 of 4 units completed"));
    }

    #[test]
    fn json_error_carries_reason_and_details() {
        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&abort(ProbeTestError::Aborted))).unwrap();
        assert_eq!(v["reason"], "Aborted");
        assert_eq!(v["details"]["planned"], 4);
        assert_eq!(v["details"]["not_run"], 4);

        let v: serde_json::Value =
            serde_json::from_str(&format_error_json(&eyre::eyre!("boom"))).unwrap();
        assert_eq!(v["reason"], "Error");
        assert!(v.get("details").is_none());
    }
}
