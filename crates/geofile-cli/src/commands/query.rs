//! Query command - run one index query against a data file.

use crate::app::App;
use crate::{DataArgs, OutputFormat, QueryMode};
use geofile_core::{BBox, Feature, GeofileConfig, QueryOptions, Radius};
use serde_json::{json, Value};
use std::time::Instant;

/// Run the query command.
pub fn run(
    config: GeofileConfig,
    args: DataArgs,
    mode: QueryMode,
    limit: Option<usize>,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let limit = limit.unwrap_or(config.general.max_results);
    let app = App::new(config, args)?;
    let file = app.open()?;

    let mut opts = QueryOptions::new().with_max_features(limit);
    let start = Instant::now();
    let results = match mode {
        QueryMode::Bbox {
            min_x,
            min_y,
            max_x,
            max_y,
        } => file.bbox(&BBox::new(min_x, min_y, max_x, max_y), &opts)?,
        QueryMode::Point { lon, lat } => file.point(lon, lat, &opts)?,
        QueryMode::Nearest { lon, lat, radius } => {
            let radius = radius.map_or(Radius::Configured, Radius::Fixed);
            file.nearest(lon, lat, radius, &opts)?.into_iter().collect()
        }
        QueryMode::Search {
            attribute,
            values,
            typed,
        } => {
            let values = parse_values(&values, typed);
            file.search(&attribute, &values, &opts)?
        }
        QueryMode::Fuzzy {
            attribute,
            text,
            max_distance,
        } => {
            if let Some(max) = max_distance {
                opts = opts.with_max_text_distance(max);
            }
            file.fuzzy(&attribute, &text, &opts)?
        }
        QueryMode::Prefix { attribute, text } => file.prefix(&attribute, &text, &opts)?,
    };
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            for feature in &results {
                println!("{}", render_text(feature));
            }

            eprintln!();
            eprintln!(
                "Found {} features in {:.3}ms",
                results.len(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            let json_results: Vec<Value> = results.iter().map(render_json).collect();
            println!("{}", serde_json::to_string_pretty(&json_results)?);
        }
    }

    Ok(())
}

/// Query values from the command line: plain strings, or JSON scalars
/// when `typed` (anything that is not valid JSON stays a string).
fn parse_values(values: &[String], typed: bool) -> Vec<Value> {
    values
        .iter()
        .map(|v| {
            if typed {
                serde_json::from_str(v).unwrap_or_else(|_| Value::String(v.clone()))
            } else {
                Value::String(v.clone())
            }
        })
        .collect()
}

fn render_text(feature: &Feature) -> String {
    let mut line = format!("#{}", feature.rank);
    if let Some(bbox) = feature.bbox {
        line.push_str(&format!(" {}", bbox));
    }
    if let Some(distance) = feature.distance {
        line.push_str(&format!(" d={:.6}", distance));
    }
    for (key, value) in &feature.properties {
        match value {
            Value::String(s) => line.push_str(&format!(" {}={}", key, s)),
            other => line.push_str(&format!(" {}={}", key, other)),
        }
    }
    line
}

fn render_json(feature: &Feature) -> Value {
    json!({
        "rank": feature.rank,
        "pos": feature.pos,
        "len": feature.len,
        "bbox": feature.bbox.map(|b| [b.min_x, b.min_y, b.max_x, b.max_y]),
        "distance": feature.distance,
        "projection": feature.projection,
        "properties": feature.properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;
    use geofile_core::Handle;
    use serde_json::Map;

    fn mary() -> Feature {
        let mut props = Map::new();
        props.insert("name".to_string(), json!("Mary"));
        props.insert("age".to_string(), json!(42));
        Feature::new(Handle::new(1, 13, 12), Some(point!(x: 100.0, y: 100.0).into()), props)
    }

    #[test]
    fn test_parse_values() {
        let raw = vec!["42".to_string(), "Mary".to_string(), "null".to_string()];
        assert_eq!(
            parse_values(&raw, false),
            vec![json!("42"), json!("Mary"), json!("null")]
        );
        assert_eq!(parse_values(&raw, true), vec![json!(42), json!("Mary"), Value::Null]);
    }

    #[test]
    fn test_render() {
        let feature = mary();
        let text = render_text(&feature);
        assert!(text.starts_with("#1 [100, 100, 100, 100]"));
        assert!(text.contains("name=Mary"));
        assert!(text.contains("age=42"));

        let value = render_json(&feature);
        assert_eq!(value["rank"], json!(1));
        assert_eq!(value["bbox"], json!([100.0, 100.0, 100.0, 100.0]));
        assert_eq!(value["properties"]["name"], json!("Mary"));
        assert_eq!(value["distance"], Value::Null);
    }
}
