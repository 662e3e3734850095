use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(data: &Value, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(data)?
            } else {
                serde_json::to_string(data)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => render_table(data)?,
    }
    Ok(())
}

fn render_table(data: &Value) -> Result<(), CliError> {
    let Some(table) = data.get("table") else {
        let pretty = serde_json::to_string_pretty(data)?;
        println!("{pretty}");
        return Ok(());
    };

    let headers: Vec<&str> = table
        .get("headers")
        .and_then(Value::as_array)
        .map(|headers| headers.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let aliases = table.get("headerAliasMap");
    let labels: Vec<String> = headers
        .iter()
        .map(|header| {
            aliases
                .and_then(|map| map.get(*header))
                .and_then(Value::as_str)
                .unwrap_or(*header)
                .to_owned()
        })
        .collect();

    let rows: Vec<Vec<String>> = table
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| headers.iter().map(|header| cell_text(row.get(*header))).collect())
                .collect()
        })
        .unwrap_or_default();

    let widths: Vec<usize> = labels
        .iter()
        .enumerate()
        .map(|(index, label)| {
            rows.iter()
                .map(|row| row[index].chars().count())
                .chain(std::iter::once(label.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    println!("{}", format_line(&labels, &widths));
    println!(
        "{}",
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &rows {
        println!("{}", format_line(row, &widths));
    }

    if let Some(cache) = data.get("cache").and_then(Value::as_str) {
        println!("({} rows, cache: {cache})", rows.len());
    }
    Ok(())
}

fn cell_text(cell: Option<&Value>) -> String {
    match cell {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| cell_text(Some(item)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

fn format_line(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(" | ")
}
