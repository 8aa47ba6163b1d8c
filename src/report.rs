//! Report compilation entry points.
//!
//! [`compile_report`] is what the Download operation calls: it checks that
//! the envelope has something to show, then builds the PDF on the blocking
//! pool and resolves only once the document is fully serialised.
//!
//! A broken image never fails the report. The image page is dropped, the
//! reason is logged and kept in [`CompiledReport::warnings`], and the caller
//! still gets the transcription.

use crate::envelope::AnalysisEnvelope;
use crate::error::RxScribeError;
use crate::pipeline::report::{prepare_attachment, ReportWriter};
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Instant;
use tracing::{info, warn};

pub use crate::pipeline::report::{CompiledReport, ReportState};

/// Heading on page 1.
pub const REPORT_TITLE: &str = "Prescription Analysis Report";

/// Drawn on page 1 when the envelope has no transcription.
pub const NO_TEXT_PLACEHOLDER: &str = "No analysis text available.";

/// Compile a report for `envelope`, dated `date`.
///
/// PDF assembly is CPU-bound, so it runs in `spawn_blocking`.
///
/// # Errors
/// - [`RxScribeError::NothingToRender`]: neither text nor image present.
/// - [`RxScribeError::ReportFailed`]: the PDF could not be serialised.
pub async fn compile_report(
    envelope: AnalysisEnvelope,
    date: NaiveDate,
) -> Result<CompiledReport, RxScribeError> {
    if envelope.is_empty() {
        return Err(RxScribeError::NothingToRender);
    }
    tokio::task::spawn_blocking(move || compile_report_blocking(&envelope, date))
        .await
        .map_err(|e| RxScribeError::Internal(format!("Report task panicked: {}", e)))?
}

/// Blocking implementation of [`compile_report`].
pub fn compile_report_blocking(
    envelope: &AnalysisEnvelope,
    date: NaiveDate,
) -> Result<CompiledReport, RxScribeError> {
    if envelope.is_empty() {
        return Err(RxScribeError::NothingToRender);
    }
    let start = Instant::now();

    let mut writer = ReportWriter::new(REPORT_TITLE)?;
    writer.write_summary_page(
        REPORT_TITLE,
        date,
        envelope.text().unwrap_or(NO_TEXT_PLACEHOLDER),
    )?;

    if let Some(uri) = envelope.image_data_uri() {
        match prepare_attachment(uri) {
            Ok(image) => writer.write_image_page(image)?,
            Err(e) => {
                warn!("Prescription image left out of report: {}", e);
                writer.record_warning(e);
            }
        }
    }

    let report = writer.finish()?;
    info!(
        "Compiled report: {} page(s), {} bytes in {}ms",
        report.page_count(),
        report.bytes().len(),
        start.elapsed().as_millis()
    );
    Ok(report)
}

/// `prescription_report_<unix-millis>.pdf`
pub fn report_filename(at: DateTime<Utc>) -> String {
    format!("prescription_report_{}.pdf", at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttachmentError;
    use chrono::TimeZone;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[tokio::test]
    async fn text_only_envelope_has_one_page() {
        let env = AnalysisEnvelope {
            text: Some("Medicine Name: Paracetamol\n".into()),
            image_data_uri: None,
        };
        let report = compile_report(env, date()).await.unwrap();
        assert_eq!(report.page_count(), 1);
        assert!(report.bytes().starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn empty_envelope_is_rejected() {
        let err = compile_report(AnalysisEnvelope::default(), date())
            .await
            .unwrap_err();
        assert!(matches!(err, RxScribeError::NothingToRender));
    }

    #[tokio::test]
    async fn corrupt_image_degrades_to_text_only() {
        let env = AnalysisEnvelope {
            text: Some("Dosage: 5mg".into()),
            image_data_uri: Some("data:image/jpeg;base64,!!!!".into()),
        };
        let report = compile_report(env, date()).await.unwrap();
        assert_eq!(report.page_count(), 1);
        assert!(matches!(
            report.warnings(),
            [AttachmentError::InvalidBase64 { .. }]
        ));
    }

    #[test]
    fn image_without_text_uses_placeholder_page() {
        let env = AnalysisEnvelope {
            text: None,
            image_data_uri: Some("not a data uri".into()),
        };
        let report = compile_report_blocking(&env, date()).unwrap();
        assert_eq!(report.page_count(), 1);
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn filename_uses_unix_millis() {
        let at = Utc.timestamp_millis_opt(1_760_000_000_123).unwrap();
        assert_eq!(report_filename(at), "prescription_report_1760000000123.pdf");
    }
}
