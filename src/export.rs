// src/export.rs
//! Comma-separated export of the normalized table.

use crate::pipeline::NormalizedProfile;
use anyhow::{Context, Result};

/// Render headers and rows as CSV text. Fields containing commas, quotes
/// or newlines are quoted, with embedded quotes doubled.
pub fn table_to_csv(headers: &[String], rows: &[Vec<String>]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    writer
        .write_record(headers)
        .context("Failed to write CSV header row")?;
    for row in rows {
        writer.write_record(row).context("Failed to write CSV row")?;
    }

    let bytes = writer
        .into_inner()
        .context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

pub fn profile_to_csv(profile: &NormalizedProfile) -> Result<String> {
    table_to_csv(&profile.table_headers, &profile.table_rows)
}

/// Timestamped attachment name for the download.
pub fn export_filename() -> String {
    format!(
        "linkedin_data_{}.csv",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_fields_are_left_unquoted() {
        let csv = table_to_csv(
            &strings(&["Name", "Industry"]),
            &[strings(&["Jane", "Software"])],
        )
        .unwrap();

        assert_eq!(csv, "Name,Industry\nJane,Software\n");
    }

    #[test]
    fn awkward_fields_are_quoted_with_doubled_quotes() {
        let cell = "He said, \"hi\"\nBye";
        let csv = table_to_csv(&strings(&["Comment"]), &[vec![cell.to_string()]]).unwrap();

        assert!(csv.contains("\"He said, \"\"hi\"\"\nBye\""));
    }

    #[test]
    fn export_round_trips_through_a_csv_reader() {
        let cell = "He said, \"hi\"\nBye";
        let headers = strings(&["Name", "Comment"]);
        let rows = vec![strings(&["Jane", cell])];

        let csv_text = table_to_csv(&headers, &rows).unwrap();

        let mut reader = csv::ReaderBuilder::new().from_reader(csv_text.as_bytes());
        let parsed_headers: Vec<String> =
            reader.headers().unwrap().iter().map(String::from).collect();
        let parsed_rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();

        assert_eq!(parsed_headers, headers);
        assert_eq!(parsed_rows, rows);
    }

    #[test]
    fn profile_export_uses_the_table_fields() {
        let profile = NormalizedProfile {
            summary: "two rows".to_string(),
            table_headers: strings(&["Name"]),
            table_rows: vec![strings(&["Jane"]), strings(&["Joe"])],
            ..NormalizedProfile::default()
        };

        let csv = profile_to_csv(&profile).unwrap();
        assert_eq!(csv, "Name\nJane\nJoe\n");
    }

    #[test]
    fn export_filename_is_csv() {
        let name = export_filename();
        assert!(name.starts_with("linkedin_data_"));
        assert!(name.ends_with(".csv"));
    }
}
