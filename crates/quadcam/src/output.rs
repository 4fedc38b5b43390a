use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result that can be printed in every output format.
pub trait Report: Serialize {
    /// Column headers and rows for table output.
    fn table(&self) -> (Vec<&'static str>, Vec<Vec<String>>);

    /// One-line human summary.
    fn pretty(&self) -> String;
}

pub fn print_report<R: Report>(report: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let (header, rows) = report.table();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(header);
            for row in rows {
                table.add_row(row);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", report.pretty()),
    }
}

/// Two-column table rows from key/value pairs.
pub fn field_rows<const N: usize>(fields: [(&str, String); N]) -> Vec<Vec<String>> {
    fields
        .into_iter()
        .map(|(key, value)| vec![key.to_string(), value])
        .collect()
}

/// Device command legend, as printed by the desktop capture tool.
pub const COMMAND_LEGEND: &str = "\
Cameras

  a  Disable CC1
  b  Disable CC2
  c  Disable CC3
  d  Disable CC4

Controls

  ^  Reset
  +  Capture / Cancel
  *  Instant Capture Mode
  /  Delayed Capture Mode   [Default]
  >  Image ---> USB         [Default]
  .  Image -/-> USB
  ~  Auto Framerate         [Default]
  !  Fixed Framerate
  ]  Video During Transfer  [Default]
  [  Still During Transfer
  }  Capture Sync           [Default]
  {  Capture No Sync
  #  Clear Video
  ?  Print RAM errors

Pages

  0  Loading Page
  1  Probe Page
  2  Check Page
  3  Test Page
  4  Status Page
  5  Console
  6  Still Captures
  7  Camera Video
  8  Vertical Stripes
  9  Screen Saver
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_rows_pairs_keys_and_values() {
        let rows = field_rows([("frames", "2".to_string()), ("bytes", "10".to_string())]);
        assert_eq!(rows, vec![vec!["frames", "2"], vec!["bytes", "10"]]);
    }

    #[test]
    fn legend_lists_every_page() {
        for page in 0..=9 {
            assert!(COMMAND_LEGEND.contains(&format!("  {page}  ")));
        }
    }
}
