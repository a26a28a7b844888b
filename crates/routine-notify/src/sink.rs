use crate::types::{Delivery, GroupReport, NotificationSinkKind};

/// Destination for group reports. Sends are best-effort: a failed send is
/// logged and reported as [`Delivery::Dropped`], never retried or queued.
pub trait ReportSink: Send {
    fn kind(&self) -> NotificationSinkKind;
    fn send(&mut self, report: &GroupReport) -> Delivery;
}

/// Writes each report line to stdout. Used when no endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn kind(&self) -> NotificationSinkKind {
        NotificationSinkKind::Stdout
    }

    fn send(&mut self, report: &GroupReport) -> Delivery {
        match report.encode_line() {
            Ok(line) => {
                print!("{line}");
                tracing::info!(group = %report.group, "group report written to stdout");
                Delivery::Sent
            }
            Err(err) => {
                tracing::error!(group = %report.group, error = %err, "dropping group report");
                Delivery::Dropped {
                    reason: err.to_string(),
                }
            }
        }
    }
}
