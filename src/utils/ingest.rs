use anyhow::{anyhow, Result};
use calamine::{open_workbook_auto_from_rs, Reader};
use serde_json::{json, Value};
use std::io::Cursor;

/// Tabular file ingestion. Everything becomes a header list plus one JSON
/// object per row with string values; that snapshot is what the in-call
/// query tool searches.

/// Drop columns and rows that are entirely empty, mirroring what the
/// spreadsheet exports tend to contain (trailing blank grid).
fn prune_empty(headers: Vec<String>, grid: Vec<Vec<String>>) -> (Vec<String>, Vec<Value>) {
    let keep: Vec<usize> = (0..headers.len())
        .filter(|&i| {
            !headers[i].trim().is_empty()
                || grid
                    .iter()
                    .any(|row| row.get(i).map(|c| !c.trim().is_empty()).unwrap_or(false))
        })
        .collect();

    let columns: Vec<String> = keep.iter().map(|&i| headers[i].trim().to_string()).collect();
    let rows = grid
        .into_iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (pos, &i) in keep.iter().enumerate() {
                let cell = row.get(i).cloned().unwrap_or_default();
                object.insert(columns[pos].clone(), json!(cell));
            }
            Value::Object(object)
        })
        .collect();
    (columns, rows)
}

pub fn parse_csv(data: &[u8]) -> Result<(Vec<String>, Vec<Value>)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(Cursor::new(data));

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| anyhow!("Invalid CSV header: {}", e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| anyhow!("Invalid CSV row: {}", e))?;
        grid.push(record.iter().map(|c| c.to_string()).collect());
    }

    if headers.is_empty() {
        return Err(anyhow!("CSV file has no header row"));
    }
    Ok(prune_empty(headers, grid))
}

pub fn parse_excel(data: &[u8]) -> Result<(Vec<String>, Vec<Value>)> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec()))
        .map_err(|e| anyhow!("Invalid Excel file: {}", e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Excel file has no sheets"))?
        .map_err(|e| anyhow!("Unreadable Excel sheet: {}", e))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| anyhow!("Excel sheet is empty"))?
        .iter()
        .map(|cell| cell.to_string())
        .collect();
    let grid: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    Ok(prune_empty(headers, grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_with_headers() {
        let data = b"ward,officer,phone\n12,Sharma,100\n14,Verma,101\n";
        let (columns, rows) = parse_csv(data).unwrap();
        assert_eq!(columns, vec!["ward", "officer", "phone"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["officer"], "Sharma");
        assert_eq!(rows[1]["phone"], "101");
    }

    #[test]
    fn drops_fully_empty_rows_and_columns() {
        let data = b"ward,officer,\n12,Sharma,\n,,\n14,Verma,\n";
        let (columns, rows) = parse_csv(data).unwrap();
        assert_eq!(columns, vec!["ward", "officer"]);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].get("").is_none());
    }

    #[test]
    fn ragged_rows_fill_missing_cells() {
        let data = b"a,b,c\n1,2\n";
        let (_, rows) = parse_csv(data).unwrap();
        assert_eq!(rows[0]["c"], "");
    }

    #[test]
    fn rejects_empty_input() {
        assert!(parse_csv(b"").is_err() || parse_csv(b"").unwrap().0.is_empty());
    }
}
