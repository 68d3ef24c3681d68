/// Generic formatting code for a set of data extracted from a data structure, presented
/// columnar, as csv, or as json, with or without a header.
///
/// The caller supplies a map of named formatter functions over its row type, an alias map, and
/// a field spec string `(field|alias|control),...`.  Spec words that name neither a field nor
/// an alias are collected as "control" words and interpreted by `standard_options`:
///
///   csv        csv output
///   csvnamed   csv output with field=value cells
///   json       json output
///   fixed      fixed-width columnar output (the default)
///   header     print a header row (default for fixed)
///   noheader   suppress the header row
///   tag:VALUE  append a constant tag column
use anyhow::{bail, Result};
use json;
use std::collections::{HashMap, HashSet};
use std::io;

pub type Formatter<D, C> = fn(&D, &C) -> String;

pub struct FormatOptions {
    pub csv: bool,
    pub json: bool,
    pub fixed: bool,
    pub named: bool,
    pub header: bool,
    pub tag: Option<String>,
}

/// Split the spec into known fields (aliases expanded) and control words.  An error if no
/// output field remains.

pub fn parse_fields<'a, D, C>(
    spec: &'a str,
    formatters: &HashMap<String, Formatter<D, C>>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)> {
    let mut fields = vec![];
    let mut others = HashSet::new();
    for word in spec.split(',') {
        if formatters.contains_key(word) {
            fields.push(word);
        } else if let Some(expansion) = aliases.get(word) {
            for name in expansion {
                if formatters.contains_key(name) {
                    fields.push(name.as_str());
                } else {
                    others.insert(name.as_str());
                }
            }
        } else {
            others.insert(word);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected by spec '{spec}'");
    }
    Ok((fields, others))
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let named = others.contains("csvnamed");
    let csv = others.contains("csv") || named;
    let json = others.contains("json") && !csv;
    let fixed = !csv && !json;
    // json carries its own structure; a header applies to fixed and (opt-in) csv.
    let header = (fixed && !others.contains("noheader")) || (csv && others.contains("header"));
    let tag = others
        .iter()
        .find_map(|x| x.strip_prefix("tag:").map(|t| t.to_string()));
    FormatOptions {
        csv,
        json,
        fixed,
        named,
        header,
        tag,
    }
}

/// Apply the named formatters to every datum and render the resulting columns in the mode the
/// options select.  Output errors are ignored; they are common for broken pipelines.

pub fn format_data<D, C>(
    output: &mut dyn io::Write,
    fields: &[&str],
    formatters: &HashMap<String, Formatter<D, C>>,
    opts: &FormatOptions,
    data: &[D],
    ctx: &C,
) {
    let cols = fields
        .iter()
        .map(|kwd| {
            let fmt = formatters[*kwd];
            data.iter().map(|d| fmt(d, ctx)).collect::<Vec<String>>()
        })
        .collect::<Vec<Vec<String>>>();

    if opts.csv {
        format_csv(output, fields, opts, &cols);
    } else if opts.json {
        format_json(output, fields, opts, &cols);
    } else {
        format_fixed_width(output, fields, opts, &cols);
    }
}

fn format_fixed_width(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: &[Vec<String>],
) {
    let nrows = cols.first().map_or(0, |c| c.len());
    let mut widths = fields
        .iter()
        .zip(cols)
        .map(|(kwd, col)| {
            let body = col.iter().map(|v| v.len()).max().unwrap_or(0);
            if opts.header {
                usize::max(body, kwd.len())
            } else {
                body
            }
        })
        .collect::<Vec<usize>>();
    if opts.tag.is_some() {
        let tag_width = opts.tag.as_ref().map_or(0, |t| t.len());
        widths.push(if opts.header {
            usize::max(tag_width, "tag".len())
        } else {
            tag_width
        });
    }

    let mut emit = |cells: Vec<&str>| {
        let mut line = String::new();
        for (i, cell) in cells.iter().enumerate() {
            let w = widths[i];
            line += &format!("{cell:w$}  ");
        }
        let _ = output.write(line.trim_end().as_bytes());
        let _ = output.write(b"\n");
    };

    if opts.header {
        let mut cells = fields.to_vec();
        if opts.tag.is_some() {
            cells.push("tag");
        }
        emit(cells);
    }
    for row in 0..nrows {
        let mut cells = cols.iter().map(|col| col[row].as_str()).collect::<Vec<&str>>();
        if let Some(ref tag) = opts.tag {
            cells.push(tag.as_str());
        }
        emit(cells);
    }
}

fn format_csv(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: &[Vec<String>],
) {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);
    let nrows = cols.first().map_or(0, |c| c.len());

    if opts.header {
        let mut cells = fields.iter().map(|f| f.to_string()).collect::<Vec<String>>();
        if opts.tag.is_some() {
            cells.push("tag".to_string());
        }
        let _ = writer.write_record(cells);
    }
    for row in 0..nrows {
        let mut cells = vec![];
        for (i, col) in cols.iter().enumerate() {
            if opts.named {
                cells.push(format!("{}={}", fields[i], col[row]));
            } else {
                cells.push(col[row].clone());
            }
        }
        if let Some(ref tag) = opts.tag {
            if opts.named {
                cells.push(format!("tag={tag}"));
            } else {
                cells.push(tag.clone());
            }
        }
        let _ = writer.write_record(cells);
    }
    let _ = writer.flush();
}

fn format_json(
    output: &mut dyn io::Write,
    fields: &[&str],
    opts: &FormatOptions,
    cols: &[Vec<String>],
) {
    let nrows = cols.first().map_or(0, |c| c.len());
    let mut objects = vec![];
    for row in 0..nrows {
        let mut obj = json::JsonValue::new_object();
        for (i, col) in cols.iter().enumerate() {
            obj[fields[i]] = col[row].clone().into();
        }
        if let Some(ref tag) = opts.tag {
            obj["tag"] = tag.clone().into();
        }
        objects.push(obj);
    }
    let _ = output.write(json::stringify(objects).as_bytes());
    let _ = output.write(b"\n");
}

#[cfg(test)]
struct Item {
    name: &'static str,
    value: i64,
}

#[cfg(test)]
fn test_formatters() -> (
    HashMap<String, Formatter<Item, ()>>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, Formatter<Item, ()>> = HashMap::new();
    formatters.insert("name".to_string(), |d: &Item, _| d.name.to_string());
    formatters.insert("value".to_string(), |d: &Item, _| d.value.to_string());
    let mut aliases = HashMap::new();
    aliases.insert(
        "all".to_string(),
        vec!["name".to_string(), "value".to_string()],
    );
    (formatters, aliases)
}

#[cfg(test)]
fn test_data() -> Vec<Item> {
    vec![
        Item {
            name: "alpha",
            value: 10,
        },
        Item {
            name: "b",
            value: 12345,
        },
    ]
}

#[test]
fn test_parse_fields_and_aliases() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("all,csv", &formatters, &aliases).unwrap();
    assert!(fields == vec!["name", "value"]);
    assert!(others.contains("csv"));

    let (fields, _) = parse_fields("value", &formatters, &aliases).unwrap();
    assert!(fields == vec!["value"]);

    assert!(parse_fields("csv,noheader", &formatters, &aliases).is_err());
}

#[test]
fn test_standard_options() {
    let mut others = HashSet::new();
    others.insert("csvnamed");
    others.insert("tag:run1");
    let opts = standard_options(&others);
    assert!(opts.csv && opts.named && !opts.json && !opts.fixed);
    assert!(!opts.header);
    assert!(opts.tag.as_deref() == Some("run1"));

    let opts = standard_options(&HashSet::new());
    assert!(opts.fixed && opts.header);
}

#[test]
fn test_fixed_width_output() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("all", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), &());
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines == vec!["name   value", "alpha  10", "b      12345"]);
}

#[test]
fn test_csv_output() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("all,csv,header", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), &());
    let text = String::from_utf8(out).unwrap();
    assert!(text == "name,value\nalpha,10\nb,12345\n");
}

#[test]
fn test_csvnamed_output() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("name,csvnamed", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), &());
    let text = String::from_utf8(out).unwrap();
    assert!(text == "name=alpha\nname=b\n");
}

#[test]
fn test_json_output() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("all,json", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), &());
    let text = String::from_utf8(out).unwrap();
    let parsed = json::parse(text.trim()).unwrap();
    assert!(parsed.len() == 2);
    assert!(parsed[0]["name"] == "alpha");
    assert!(parsed[1]["value"] == "12345");
}

#[test]
fn test_tag_column() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("name,csv,tag:exp7", &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, &test_data(), &());
    let text = String::from_utf8(out).unwrap();
    assert!(text == "alpha,exp7\nb,exp7\n");
}
