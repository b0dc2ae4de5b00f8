//! Report Renderer (spec.md §4.8): a format-polymorphic view over a
//! [`DiffResult`], with a flat "traditional" mode and a table-first
//! "grouped" mode (fed by [`crate::grouping::group`]). No renderer here
//! performs I/O — the boundary writes the returned bytes to disk and owns
//! the overwrite policy.

use chrono::{DateTime, Utc};
use pgschema_diff_types::{
    ChangeSet, DiffResult, GroupedDiff, OutputConfig, PostgresVersion, ReportFormat,
};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};

/// Everything a report needs besides the diff itself: which schemas were
/// compared, against which server versions, and when.
#[derive(Debug, Clone)]
pub struct ReportMetadata {
    pub source_label: String,
    pub target_label: String,
    pub source_version: Option<PostgresVersion>,
    pub target_version: Option<PostgresVersion>,
    pub generated_at: DateTime<Utc>,
    pub include_summary: bool,
    pub include_details: bool,
}

/// One rendering attempt's outcome. A failure in one format never aborts
/// the others — see [`render_all`].
pub struct RenderedReport {
    pub format: ReportFormat,
    pub result: Result<Vec<u8>>,
}

pub trait Renderer {
    fn format(&self) -> ReportFormat;
    fn generate(&self, diff: &DiffResult, grouped: Option<&GroupedDiff>, metadata: &ReportMetadata) -> Result<Vec<u8>>;
    fn validate(&self, bytes: &[u8]) -> bool;
}

fn renderer_for(format: ReportFormat) -> Box<dyn Renderer> {
    match format {
        ReportFormat::Html => Box::new(HtmlRenderer),
        ReportFormat::Markdown => Box::new(MarkdownRenderer),
        ReportFormat::Json => Box::new(JsonRenderer),
        ReportFormat::Xml => Box::new(XmlRenderer),
    }
}

/// Renders every format `config.formats` names. Each attempt is
/// independent: one renderer's failure is recorded but does not prevent
/// the others from running, per spec.md §7's propagation rule that a
/// single-format failure degrades rather than aborts the report step.
pub fn render_all(diff: &DiffResult, config: &OutputConfig, metadata: &ReportMetadata) -> Vec<RenderedReport> {
    let grouped = if config.group_by_table {
        Some(crate::grouping::group(diff))
    } else {
        None
    };

    config
        .formats
        .iter()
        .map(|format| {
            let renderer = renderer_for(*format);
            let result = renderer.generate(diff, grouped.as_ref(), metadata);
            RenderedReport { format: *format, result }
        })
        .collect()
}

fn summary_json(diff: &DiffResult) -> serde_json::Value {
    let s = diff.summary();
    json!({
        "tables": {"added": s.tables.added, "removed": s.tables.removed, "modified": s.tables.modified},
        "columns": {"added": s.columns.added, "removed": s.columns.removed, "modified": s.columns.modified},
        "constraints": {"added": s.constraints.added, "removed": s.constraints.removed, "modified": s.constraints.modified},
        "indexes": {"added": s.indexes.added, "removed": s.indexes.removed, "modified": s.indexes.modified},
        "triggers": {"added": s.triggers.added, "removed": s.triggers.removed, "modified": s.triggers.modified},
        "views": {"added": s.views.added, "removed": s.views.removed, "modified": s.views.modified},
        "sequences": {"added": s.sequences.added, "removed": s.sequences.removed, "modified": s.sequences.modified},
        "functions": {"added": s.functions.added, "removed": s.functions.removed, "modified": s.functions.modified},
        "total_changes": s.total_changes,
    })
}

fn metadata_json(metadata: &ReportMetadata) -> serde_json::Value {
    json!({
        "source": metadata.source_label,
        "target": metadata.target_label,
        "source_version": metadata.source_version.as_ref().map(|v| v.to_string()),
        "target_version": metadata.target_version.as_ref().map(|v| v.to_string()),
        "generated_at": metadata.generated_at.to_rfc3339(),
    })
}

struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn generate(&self, diff: &DiffResult, grouped: Option<&GroupedDiff>, metadata: &ReportMetadata) -> Result<Vec<u8>> {
        let mut doc = serde_json::Map::new();
        doc.insert("metadata".to_string(), metadata_json(metadata));
        if metadata.include_summary {
            doc.insert("summary".to_string(), summary_json(diff));
        }
        if metadata.include_details {
            let details = match grouped {
                Some(g) => serde_json::to_value(g),
                None => serde_json::to_value(diff),
            }
            .map_err(|e| Error::ReportGenerationFailed {
                format: "json".to_string(),
                message: e.to_string(),
            })?;
            doc.insert("details".to_string(), details);
        }
        serde_json::to_vec_pretty(&doc).map_err(|e| Error::ReportGenerationFailed {
            format: "json".to_string(),
            message: e.to_string(),
        })
    }

    fn validate(&self, bytes: &[u8]) -> bool {
        serde_json::from_slice::<serde_json::Value>(bytes).is_ok()
    }
}

struct MarkdownRenderer;

fn md_changeset_section<T: Serialize>(out: &mut String, title: &str, changes: &ChangeSet<T>, name_of: impl Fn(&T) -> String) {
    if changes.is_empty() {
        return;
    }
    out.push_str(&format!("\n### {title}\n\n"));
    if !changes.added.is_empty() {
        out.push_str("**Added:**\n\n");
        for item in &changes.added {
            out.push_str(&format!("- `{}`\n", name_of(item)));
        }
        out.push('\n');
    }
    if !changes.removed.is_empty() {
        out.push_str("**Removed:**\n\n");
        for item in &changes.removed {
            out.push_str(&format!("- `{}`\n", name_of(item)));
        }
        out.push('\n');
    }
    if !changes.modified.is_empty() {
        out.push_str("**Modified:**\n\n");
        for m in &changes.modified {
            out.push_str(&format!("- `{}`:", name_of(&m.item)));
            for (field, change) in &m.changes {
                out.push_str(&format!(" {field} `{}` → `{}`;", change.from, change.to));
            }
            out.push('\n');
        }
        out.push('\n');
    }
}

impl Renderer for MarkdownRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Markdown
    }

    fn generate(&self, diff: &DiffResult, grouped: Option<&GroupedDiff>, metadata: &ReportMetadata) -> Result<Vec<u8>> {
        let mut out = String::new();
        out.push_str("# Schema Diff Report\n\n");
        out.push_str(&format!("- Source: `{}`\n", metadata.source_label));
        out.push_str(&format!("- Target: `{}`\n", metadata.target_label));
        out.push_str(&format!("- Generated at: {}\n", metadata.generated_at.to_rfc3339()));

        if metadata.include_summary {
            let s = diff.summary();
            out.push_str(&format!("\n## Summary\n\nTotal changes: **{}**\n", s.total_changes));
        }

        if metadata.include_details {
            match grouped {
                Some(g) => render_markdown_grouped(&mut out, g),
                None => render_markdown_traditional(&mut out, diff),
            }
        }

        Ok(out.into_bytes())
    }

    fn validate(&self, bytes: &[u8]) -> bool {
        std::str::from_utf8(bytes).map(|s| s.starts_with("# ")).unwrap_or(false)
    }
}

fn render_markdown_traditional(out: &mut String, diff: &DiffResult) {
    md_changeset_section(out, "Tables", &diff.tables, |t| t.name.clone());
    md_changeset_section(out, "Columns", &diff.columns, |c| format!("{}.{}", c.table_name, c.name));
    md_changeset_section(out, "Constraints", &diff.constraints, |c| format!("{}.{}", c.table_name, c.name));
    md_changeset_section(out, "Indexes", &diff.indexes, |i| format!("{}.{}", i.table_name, i.name));
    md_changeset_section(out, "Triggers", &diff.triggers, |t| format!("{}.{}", t.table_name, t.name));
    md_changeset_section(out, "Views", &diff.views, |v| v.name.clone());
    md_changeset_section(out, "Sequences", &diff.sequences, |s| s.name.clone());
    md_changeset_section(out, "Functions", &diff.functions, |f| f.name.clone());
}

fn render_markdown_grouped(out: &mut String, grouped: &GroupedDiff) {
    for group in grouped.added.iter().chain(grouped.removed.iter()).chain(grouped.modified.iter()) {
        out.push_str(&format!("\n### {} ({:?})\n\n", group.table_name, group.change_type));
        for (bucket, items) in &group.children {
            out.push_str(&format!("- {bucket}: {} change(s)\n", items.len()));
        }
    }
}

struct HtmlRenderer;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

impl Renderer for HtmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Html
    }

    fn generate(&self, diff: &DiffResult, grouped: Option<&GroupedDiff>, metadata: &ReportMetadata) -> Result<Vec<u8>> {
        let mut body = String::new();
        body.push_str(&format!(
            "<h1>Schema Diff Report</h1>\n<p>Source: {} &mdash; Target: {}</p>\n<p>Generated at {}</p>\n",
            html_escape(&metadata.source_label),
            html_escape(&metadata.target_label),
            metadata.generated_at.to_rfc3339(),
        ));

        if metadata.include_summary {
            let s = diff.summary();
            body.push_str(&format!("<h2>Summary</h2>\n<p>Total changes: {}</p>\n", s.total_changes));
        }

        if metadata.include_details {
            match grouped {
                Some(g) => {
                    body.push_str("<h2>Changes by table</h2>\n<ul>\n");
                    for group in g.added.iter().chain(g.removed.iter()).chain(g.modified.iter()) {
                        body.push_str(&format!(
                            "<li>{} ({:?}) — {} change(s)</li>\n",
                            html_escape(&group.table_name),
                            group.change_type,
                            group.total_changes()
                        ));
                    }
                    body.push_str("</ul>\n");
                }
                None => {
                    body.push_str("<h2>Tables</h2>\n<ul>\n");
                    for t in &diff.tables.added {
                        body.push_str(&format!("<li>added: {}</li>\n", html_escape(&t.name)));
                    }
                    for t in &diff.tables.removed {
                        body.push_str(&format!("<li>removed: {}</li>\n", html_escape(&t.name)));
                    }
                    for m in &diff.tables.modified {
                        body.push_str(&format!("<li>modified: {}</li>\n", html_escape(&m.item.name)));
                    }
                    body.push_str("</ul>\n");
                }
            }
        }

        let html = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Schema Diff Report</title></head>\n<body>\n{body}</body>\n</html>\n"
        );
        Ok(html.into_bytes())
    }

    fn validate(&self, bytes: &[u8]) -> bool {
        std::str::from_utf8(bytes)
            .map(|s| s.contains("<html") && s.trim_end().ends_with("</html>"))
            .unwrap_or(false)
    }
}

struct XmlRenderer;

impl XmlRenderer {
    fn write_changeset<T>(
        &self,
        writer: &mut Writer<Vec<u8>>,
        tag: &str,
        changes: &ChangeSet<T>,
        name_of: impl Fn(&T) -> String,
    ) -> std::result::Result<(), quick_xml::Error> {
        writer.write_event(Event::Start(BytesStart::new(tag)))?;
        for item in &changes.added {
            self.write_named(writer, "added", &name_of(item))?;
        }
        for item in &changes.removed {
            self.write_named(writer, "removed", &name_of(item))?;
        }
        for m in &changes.modified {
            self.write_named(writer, "modified", &name_of(&m.item))?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(())
    }

    fn write_named(&self, writer: &mut Writer<Vec<u8>>, tag: &str, name: &str) -> std::result::Result<(), quick_xml::Error> {
        let mut start = BytesStart::new(tag);
        start.push_attribute(("name", name));
        writer.write_event(Event::Empty(start))?;
        Ok(())
    }
}

impl Renderer for XmlRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xml
    }

    fn generate(&self, diff: &DiffResult, grouped: Option<&GroupedDiff>, metadata: &ReportMetadata) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let to_error = |e: quick_xml::Error| Error::ReportGenerationFailed {
            format: "xml".to_string(),
            message: e.to_string(),
        };

        let mut root = BytesStart::new("schema_diff");
        root.push_attribute(("source", metadata.source_label.as_str()));
        root.push_attribute(("target", metadata.target_label.as_str()));
        writer.write_event(Event::Start(root)).map_err(to_error)?;

        if metadata.include_summary {
            let s = diff.summary();
            let mut summary = BytesStart::new("summary");
            summary.push_attribute(("total_changes", s.total_changes.to_string().as_str()));
            writer.write_event(Event::Empty(summary)).map_err(to_error)?;
        }

        if metadata.include_details {
            match grouped {
                Some(g) => {
                    writer.write_event(Event::Start(BytesStart::new("groups"))).map_err(to_error)?;
                    for group in g.added.iter().chain(g.removed.iter()).chain(g.modified.iter()) {
                        let mut elem = BytesStart::new("table");
                        elem.push_attribute(("name", group.table_name.as_str()));
                        elem.push_attribute(("change_type", format!("{:?}", group.change_type).as_str()));
                        writer.write_event(Event::Start(elem)).map_err(to_error)?;
                        writer
                            .write_event(Event::Text(BytesText::new(&group.total_changes().to_string())))
                            .map_err(to_error)?;
                        writer.write_event(Event::End(BytesEnd::new("table"))).map_err(to_error)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("groups"))).map_err(to_error)?;
                }
                None => {
                    self.write_changeset(&mut writer, "tables", &diff.tables, |t| t.name.clone()).map_err(to_error)?;
                    self.write_changeset(&mut writer, "columns", &diff.columns, |c| format!("{}.{}", c.table_name, c.name))
                        .map_err(to_error)?;
                    self.write_changeset(&mut writer, "constraints", &diff.constraints, |c| {
                        format!("{}.{}", c.table_name, c.name)
                    })
                    .map_err(to_error)?;
                    self.write_changeset(&mut writer, "indexes", &diff.indexes, |i| format!("{}.{}", i.table_name, i.name))
                        .map_err(to_error)?;
                    self.write_changeset(&mut writer, "triggers", &diff.triggers, |t| format!("{}.{}", t.table_name, t.name))
                        .map_err(to_error)?;
                    self.write_changeset(&mut writer, "views", &diff.views, |v| v.name.clone()).map_err(to_error)?;
                    self.write_changeset(&mut writer, "sequences", &diff.sequences, |s| s.name.clone()).map_err(to_error)?;
                    self.write_changeset(&mut writer, "functions", &diff.functions, |f| f.name.clone()).map_err(to_error)?;
                }
            }
        }

        writer.write_event(Event::End(BytesEnd::new("schema_diff"))).map_err(to_error)?;
        Ok(writer.into_inner())
    }

    fn validate(&self, bytes: &[u8]) -> bool {
        let mut reader = quick_xml::Reader::from_reader(bytes);
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgschema_diff_types::Table;

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            source_label: "db-a".to_string(),
            target_label: "db-b".to_string(),
            source_version: None,
            target_version: None,
            generated_at: Utc::now(),
            include_summary: true,
            include_details: true,
        }
    }

    fn sample_diff() -> DiffResult {
        let mut diff = DiffResult::default();
        diff.tables.added.push(Table {
            name: "comments".to_string(),
            table_type: "BASE TABLE".to_string(),
            comment: None,
            estimated_rows: None,
            pretty_size: None,
            columns: vec![],
            constraints: vec![],
            indexes: vec![],
            triggers: vec![],
        });
        diff
    }

    #[test]
    fn json_renderer_round_trips_through_validate() {
        let bytes = JsonRenderer.generate(&sample_diff(), None, &metadata()).unwrap();
        assert!(JsonRenderer.validate(&bytes));
    }

    #[test]
    fn xml_renderer_produces_well_formed_document() {
        let bytes = XmlRenderer.generate(&sample_diff(), None, &metadata()).unwrap();
        assert!(XmlRenderer.validate(&bytes));
        assert!(std::str::from_utf8(&bytes).unwrap().contains("schema_diff"));
    }

    #[test]
    fn markdown_renderer_starts_with_a_heading() {
        let bytes = MarkdownRenderer.generate(&sample_diff(), None, &metadata()).unwrap();
        assert!(MarkdownRenderer.validate(&bytes));
    }

    #[test]
    fn html_renderer_produces_balanced_document() {
        let bytes = HtmlRenderer.generate(&sample_diff(), None, &metadata()).unwrap();
        assert!(HtmlRenderer.validate(&bytes));
    }

    #[test]
    fn render_all_runs_every_configured_format_independently() {
        let config = OutputConfig {
            formats: vec![ReportFormat::Json, ReportFormat::Html],
            ..OutputConfig::default()
        };
        let reports = render_all(&sample_diff(), &config, &metadata());
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.result.is_ok()));
    }
}
