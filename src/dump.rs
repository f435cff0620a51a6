use std::io::Write;

use rblock::{Container, Field, FieldSequence, PayloadChild, Result as BlockResult};
use rcore::Interpreted;

use crate::cli::CliError;

// Values longer than this are only shown by size
const MAX_VALUE_BYTES: u64 = 32;

pub fn container<W: Write>(out: &mut W, container: &Container, depth: usize) -> Result<(), CliError> {
    writeln!(
        out,
        "{}{} @{} [{}] #{}",
        indent(depth),
        container.id(),
        container.offset(),
        size(container.total_size()),
        container.sequence_number()
    )?;

    for header in container.headers() {
        sequence(out, "header", header, depth + 1)?;
    }

    let payload = container.payload();
    writeln!(
        out,
        "{}{} @{} [{}]",
        indent(depth + 1),
        payload.id(),
        payload.offset(),
        payload.total_size()
    )?;
    for child in payload.children()? {
        match child {
            PayloadChild::Field(f) => field(out, &f, depth + 2)?,
            PayloadChild::Container(c) => self::container(out, &c, depth + 2)?,
        }
    }

    for footer in container.footers() {
        sequence(out, "footer", footer, depth + 1)?;
    }
    Ok(())
}

fn sequence<W: Write>(
    out: &mut W,
    kind: &str,
    sequence: &FieldSequence,
    depth: usize,
) -> Result<(), CliError> {
    writeln!(
        out,
        "{}{} {} @{} [{}]",
        indent(depth),
        kind,
        sequence.id(),
        sequence.offset(),
        size(sequence.total_size())
    )?;

    for f in sequence.fields() {
        field(out, f, depth + 1)?;
    }
    Ok(())
}

fn field<W: Write>(out: &mut W, field: &Field, depth: usize) -> Result<(), CliError> {
    let value = match field.size() {
        Some(size) if size > MAX_VALUE_BYTES => format!("<{} bytes>", size),
        _ => describe(field)?,
    };

    writeln!(
        out,
        "{}{} @{} [{}] {}",
        indent(depth),
        field.id().local_id(),
        field.offset().map(|o| o.to_string()).unwrap_or_default(),
        size(field.size()),
        value
    )?;
    Ok(())
}

// Conversion failures are shown in place of the value
fn describe(field: &Field) -> BlockResult<String> {
    let raw = hex::encode(field.binary_value()?);

    Ok(match field.interpreted_value() {
        Ok(Interpreted::Binary(_)) => raw,
        Ok(Interpreted::String(s)) => format!("{:?} ({})", s, raw),
        Ok(value) => format!("{} ({})", value, raw),
        Err(e) => format!("{} (!{})", raw, e),
    })
}

fn size(size: Option<u64>) -> String {
    size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string())
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}
