//! Per-work status rows and batch summary reporting.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use tracing::warn;

use crate::format::FormatName;
use crate::work::Work;

/// Status of one work in the data directory.
///
/// One boolean field per format: the format set is closed and known at
/// compile time, so the row is a plain static record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    /// The work's DOI.
    pub doi: String,
    /// The filesystem-safe quoted DOI.
    pub doi_quoted: String,
    /// Whether metadata exists.
    pub has_metadata: bool,
    /// The member ID, when metadata is readable.
    pub member_id: Option<String>,
    /// The publisher name, when metadata is readable.
    pub publisher_name: Option<String>,
    /// The journal name, when present.
    pub journal_name: Option<String>,
    /// The work title, when present.
    pub title: Option<String>,
    /// The resolved published date, when present.
    pub published_date: Option<NaiveDate>,
    /// Whether any full-text format exists.
    pub has_fulltext: bool,
    /// Whether XML full-text exists.
    pub has_fulltext_xml: bool,
    /// Whether PDF full-text exists.
    pub has_fulltext_pdf: bool,
    /// Whether HTML full-text exists.
    pub has_fulltext_html: bool,
    /// Whether TXT full-text exists.
    pub has_fulltext_txt: bool,
    /// Whether TIFF full-text exists.
    pub has_fulltext_tiff: bool,
}

impl StatusRow {
    /// Builds the status row for one work.
    ///
    /// Metadata fields that cannot be read are reported as absent with a
    /// logged warning rather than failing the whole status run.
    #[must_use]
    pub fn from_work(work: &Work) -> Self {
        let has_metadata = work.metadata.exists();

        let mut member_id = None;
        let mut publisher_name = None;
        let mut journal_name = None;
        let mut title = None;
        let mut published_date = None;

        if has_metadata {
            member_id = soft(work, "member_id", work.metadata.member_id().map(|id| id.to_string()));
            publisher_name = soft(work, "publisher_name", work.metadata.publisher_name());
            journal_name = soft(work, "journal_name", work.metadata.journal_name()).flatten();
            title = soft(work, "title", work.metadata.title()).flatten();
            published_date = soft(work, "published_date", work.metadata.published_date()).flatten();
        }

        let has_fulltext_xml = work.fulltext.has_format(FormatName::Xml);
        let has_fulltext_pdf = work.fulltext.has_format(FormatName::Pdf);
        let has_fulltext_html = work.fulltext.has_format(FormatName::Html);
        let has_fulltext_txt = work.fulltext.has_format(FormatName::Txt);
        let has_fulltext_tiff = work.fulltext.has_format(FormatName::Tiff);

        Self {
            doi: work.doi.to_string(),
            doi_quoted: work.doi.quoted(),
            has_metadata,
            member_id,
            publisher_name,
            journal_name,
            title,
            published_date,
            has_fulltext: has_fulltext_xml
                || has_fulltext_pdf
                || has_fulltext_html
                || has_fulltext_txt
                || has_fulltext_tiff,
            has_fulltext_xml,
            has_fulltext_pdf,
            has_fulltext_html,
            has_fulltext_txt,
            has_fulltext_tiff,
        }
    }

    fn has_format(&self, format: FormatName) -> bool {
        match format {
            FormatName::Xml => self.has_fulltext_xml,
            FormatName::Pdf => self.has_fulltext_pdf,
            FormatName::Html => self.has_fulltext_html,
            FormatName::Txt => self.has_fulltext_txt,
            FormatName::Tiff => self.has_fulltext_tiff,
        }
    }
}

fn soft<T>(work: &Work, field: &str, result: Result<T, crate::metadata::MetadataError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(doi = %work.doi, field, error = %error, "could not read metadata field");
            None
        }
    }
}

/// Aggregated counts over a set of status rows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    /// Total works inspected.
    pub n_works: usize,
    /// Works with metadata.
    pub n_with_metadata: usize,
    /// Works with at least one full-text format.
    pub n_with_fulltext: usize,
    /// Works per format.
    pub n_per_format: BTreeMap<FormatName, usize>,
    /// Works per member ID (`"?"` when unreadable).
    pub n_per_member: BTreeMap<String, usize>,
}

impl StatusSummary {
    /// Aggregates a set of rows.
    #[must_use]
    pub fn from_rows(rows: &[StatusRow]) -> Self {
        let mut summary = Self {
            n_works: rows.len(),
            ..Self::default()
        };

        for row in rows {
            if row.has_metadata {
                summary.n_with_metadata += 1;
            }
            if row.has_fulltext {
                summary.n_with_fulltext += 1;
            }
            for format in FormatName::ALL {
                if row.has_format(format) {
                    *summary.n_per_format.entry(format).or_insert(0) += 1;
                }
            }
            let member = row.member_id.clone().unwrap_or_else(|| "?".to_string());
            *summary.n_per_member.entry(member).or_insert(0) += 1;
        }

        summary
    }

    /// Renders the summary as display lines.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = vec![
            format!("works: {}", self.n_works),
            format!("with metadata: {}", self.n_with_metadata),
            format!("with full-text: {}", self.n_with_fulltext),
        ];

        for format in FormatName::ALL {
            let count = self.n_per_format.get(&format).copied().unwrap_or(0);
            lines.push(format!("  {format}: {count}"));
        }

        for (member, count) in &self.n_per_member {
            lines.push(format!("member {member}: {count}"));
        }

        lines.join("\n")
    }
}

/// Writes status rows as CSV.
///
/// # Errors
///
/// Returns a CSV/IO error when the output file cannot be written.
pub fn write_csv(rows: &[StatusRow], output_path: &Path) -> csv::Result<()> {
    let mut writer = csv::Writer::from_path(output_path)?;

    writer.write_record([
        "doi",
        "doi_quoted",
        "has_metadata",
        "member_id",
        "publisher_name",
        "journal_name",
        "title",
        "published_date",
        "has_fulltext",
        "has_fulltext_xml",
        "has_fulltext_pdf",
        "has_fulltext_html",
        "has_fulltext_txt",
        "has_fulltext_tiff",
    ])?;

    for row in rows {
        writer.write_record([
            row.doi.clone(),
            row.doi_quoted.clone(),
            row.has_metadata.to_string(),
            row.member_id.clone().unwrap_or_default(),
            row.publisher_name.clone().unwrap_or_default(),
            row.journal_name.clone().unwrap_or_default(),
            row.title.clone().unwrap_or_default(),
            row.published_date
                .map(|date| date.to_string())
                .unwrap_or_default(),
            row.has_fulltext.to_string(),
            row.has_fulltext_xml.to_string(),
            row.has_fulltext_pdf.to_string(),
            row.has_fulltext_html.to_string(),
            row.has_fulltext_txt.to_string(),
            row.has_fulltext_tiff.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::doi::Doi;

    fn settings_in(temp: &tempfile::TempDir) -> Settings {
        Settings {
            data_dir: temp.path().to_path_buf(),
            metadata_compression_level: 0,
            ..Settings::default()
        }
    }

    fn work_with_metadata(settings: &Settings, doi: &str) -> Work {
        let doi = Doi::parse(doi).unwrap();
        let work = Work::new(&doi, settings);
        std::fs::create_dir_all(&work.path).unwrap();
        std::fs::write(
            &work.metadata.path,
            serde_json::to_vec(&serde_json::json!({
                "member": "340",
                "publisher": "PLoS",
                "title": ["A Paper"]
            }))
            .unwrap(),
        )
        .unwrap();
        work
    }

    #[test]
    fn test_status_row_reads_metadata_fields() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let work = work_with_metadata(&settings, "10.1234/a");

        let row = StatusRow::from_work(&work);
        assert!(row.has_metadata);
        assert_eq!(row.member_id.as_deref(), Some("340"));
        assert_eq!(row.title.as_deref(), Some("A Paper"));
        assert!(!row.has_fulltext);
    }

    #[test]
    fn test_status_row_without_metadata() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let doi = Doi::parse("10.1234/none").unwrap();
        let work = Work::new(&doi, &settings);

        let row = StatusRow::from_work(&work);
        assert!(!row.has_metadata);
        assert!(row.member_id.is_none());
    }

    #[test]
    fn test_status_row_sees_fulltext_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let work = work_with_metadata(&settings, "10.1234/a");

        let pdf_path = &work.fulltext.format(FormatName::Pdf).local_path;
        std::fs::write(pdf_path, b"%PDF-1.7").unwrap();

        let row = StatusRow::from_work(&work);
        assert!(row.has_fulltext);
        assert!(row.has_fulltext_pdf);
        assert!(!row.has_fulltext_xml);
    }

    #[test]
    fn test_summary_counts() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);

        let with_pdf = {
            let work = work_with_metadata(&settings, "10.1234/a");
            std::fs::write(&work.fulltext.format(FormatName::Pdf).local_path, b"%PDF").unwrap();
            StatusRow::from_work(&work)
        };
        let bare = StatusRow::from_work(&Work::new(
            &Doi::parse("10.1234/b").unwrap(),
            &settings,
        ));

        let summary = StatusSummary::from_rows(&[with_pdf, bare]);
        assert_eq!(summary.n_works, 2);
        assert_eq!(summary.n_with_metadata, 1);
        assert_eq!(summary.n_with_fulltext, 1);
        assert_eq!(summary.n_per_format.get(&FormatName::Pdf), Some(&1));
        assert_eq!(summary.n_per_member.get("340"), Some(&1));
        assert_eq!(summary.n_per_member.get("?"), Some(&1));
    }

    #[test]
    fn test_write_csv() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = settings_in(&temp);
        let work = work_with_metadata(&settings, "10.1234/a");
        let rows = vec![StatusRow::from_work(&work)];

        let output = temp.path().join("status.csv");
        write_csv(&rows, &output).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.starts_with("doi,"));
        assert!(content.contains("10.1234/a"));
        assert!(content.contains("340"));
    }
}
