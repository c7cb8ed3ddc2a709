//! Extraction of transfer timings from experiment logs into CSV rows.
//!
//! The surrounding experiment harness prefixes each run's output with a
//! `Run[<id>][<delay_class>][<loss>%]:` header; the transfer itself prints a
//! `Total Time: <seconds>` line at termination.

use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;

/// Pairs each run header with the next `Total Time` line and emits one
/// `madp,<delay_class>,<loss_percent>,<run_id>,<total_time>` row per run.
pub fn extract_results(log: &str) -> Vec<String> {
    let run_pattern = Regex::new(r"Run\[(\d+)\]\[(\w+)\]\[(\d+)%\]:").expect("hard-coded pattern");
    let time_pattern = Regex::new(r"Total Time:\s+(\d+\.\d+)").expect("hard-coded pattern");

    let mut rows = Vec::new();
    let mut current_run: Option<(String, String, String)> = None;

    for line in log.lines() {
        if let Some(caps) = run_pattern.captures(line) {
            current_run = Some((
                caps[1].to_string(),
                caps[2].to_string(),
                caps[3].to_string(),
            ));
            continue;
        }
        if let Some(caps) = time_pattern.captures(line) {
            if let Some((run_id, delay_class, loss_percent)) = current_run.take() {
                rows.push(format!(
                    "madp,{delay_class},{loss_percent},{run_id},{}",
                    &caps[1]
                ));
            }
        }
    }
    rows
}

/// Reads a log file and writes the extracted rows as CSV.
pub fn extract_to_csv(log_path: &Path, csv_path: &Path) -> io::Result<usize> {
    let log = fs::read_to_string(log_path)?;
    let rows = extract_results(&log);
    fs::write(csv_path, rows.join("\n"))?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Run[1][normaldelay][0%]:
-----------------------
Total Time: 1.234567
-----------------------
Run[2][highdelay][5%]:
some unrelated output
Total Time: 10.5
trailing noise without a header
Total Time: 99.9
";

    #[test]
    fn extracts_one_row_per_run() {
        let rows = extract_results(SAMPLE);
        assert_eq!(
            rows,
            vec![
                "madp,normaldelay,0,1,1.234567".to_string(),
                "madp,highdelay,5,2,10.5".to_string(),
            ]
        );
    }

    #[test]
    fn times_without_a_header_are_ignored() {
        let rows = extract_results("Total Time: 3.14\n");
        assert!(rows.is_empty());
    }

    #[test]
    fn headers_without_a_time_produce_nothing() {
        let rows = extract_results("Run[7][normaldelay][1%]:\nno timing here\n");
        assert!(rows.is_empty());
    }
}
