//! Spreadsheet export of one scanned record.
//!
//! [`project`] lays a record out as sheets: a "Header" sheet with every
//! non-table field, plus one sheet per table field with one row per array
//! item. [`ExportService`] writes the sheets into one `.xlsx` workbook.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use exto_core::context::RequestContext;
use exto_core::error::ExtoResult;
use exto_core::models::category::{Category, Field};
use exto_core::models::category_data::CategoryData;
use exto_core::repository::{
    CategoryDataRepository, CategoryRepository, FormatRepository, ScanHistoryRepository,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::categories::CategoryRegistry;
use crate::error::{ScanError, ScanResult};

pub const HEADER_SHEET: &str = "Header";

/// Longest worksheet name a workbook accepts.
const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    /// First row holds the column labels.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }
}

/// Blank for missing and null values; strings verbatim; anything else
/// as JSON.
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn columns(fields: &[Field]) -> Vec<&Field> {
    fields.iter().filter(|f| !f.is_table()).collect()
}

fn table_sheet(field: &Field, metadata: &Map<String, Value>) -> Sheet {
    let cols = columns(&field.children);
    let mut rows: Vec<Vec<String>> = vec![cols.iter().map(|c| c.label.clone()).collect()];

    if let Some(Value::Array(items)) = metadata.get(&field.name) {
        rows.extend(items.iter().filter_map(Value::as_object).map(|item| {
            cols.iter()
                .map(|c| cell(item.get(&c.name)))
                .collect::<Vec<_>>()
        }));
    }
    Sheet {
        name: field.name.clone(),
        rows,
    }
}

/// A worksheet name derived from `raw` that no earlier sheet uses.
/// Characters a workbook rejects become `_`, names are cut to 31
/// characters and repeats (compared case-insensitively) get a `_<n>`
/// suffix.
fn unique_sheet_name(raw: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('\'').trim();
    let base: String = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.chars().take(MAX_SHEET_NAME).collect()
    };

    let mut name = base.clone();
    let mut n = 2;
    // "History" is reserved by Excel.
    while taken.contains(&name.to_lowercase()) || name.eq_ignore_ascii_case("history") {
        let suffix = format!("_{n}");
        let keep = MAX_SHEET_NAME - suffix.chars().count();
        name = format!("{}{suffix}", base.chars().take(keep).collect::<String>());
        n += 1;
    }
    taken.insert(name.to_lowercase());
    name
}

/// Pure projection of `data` through `category`'s schema.
pub fn project(category: &Category, data: &CategoryData) -> Workbook {
    let header_cols = columns(&category.fields);
    let header = Sheet {
        name: HEADER_SHEET.into(),
        rows: vec![
            header_cols.iter().map(|f| f.label.clone()).collect(),
            header_cols
                .iter()
                .map(|f| cell(data.metadata.get(&f.name)))
                .collect(),
        ],
    };

    let mut sheets = vec![header];
    sheets.extend(
        category
            .table_fields()
            .map(|field| table_sheet(field, &data.metadata)),
    );

    let mut taken = HashSet::new();
    for sheet in &mut sheets {
        sheet.name = unique_sheet_name(&sheet.name, &mut taken);
    }
    Workbook { sheets }
}

/// Encodes `workbook` as `.xlsx` bytes, one worksheet per sheet. Empty
/// cells are left blank.
pub fn encode_workbook(workbook: &Workbook) -> ScanResult<Vec<u8>> {
    let mut book = rust_xlsxwriter::Workbook::new();
    for sheet in &workbook.sheets {
        let worksheet = book.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        for (r, row) in sheet.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let (Ok(r), Ok(c)) = (u32::try_from(r), u16::try_from(c)) else {
                    return Err(ScanError::SheetTooLarge(sheet.name.clone()));
                };
                worksheet.write_string(r, c, value)?;
            }
        }
    }
    Ok(book.save_to_buffer()?)
}

/// File produced by one export.
#[derive(Debug, Clone)]
pub struct ExportedWorkbook {
    pub path: PathBuf,
    pub sheets: Vec<String>,
}

/// Writes `workbook` to `path`, creating the parent directory.
pub async fn write_workbook(workbook: &Workbook, path: &Path) -> ScanResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, encode_workbook(workbook)?).await?;
    Ok(())
}

pub struct ExportService<C, F, D, S>
where
    C: CategoryRepository,
    F: FormatRepository,
    D: CategoryDataRepository,
    S: ScanHistoryRepository,
{
    registry: Arc<CategoryRegistry<C, F>>,
    records: D,
    histories: S,
    export_dir: PathBuf,
}

impl<C, F, D, S> ExportService<C, F, D, S>
where
    C: CategoryRepository,
    F: FormatRepository,
    D: CategoryDataRepository,
    S: ScanHistoryRepository,
{
    pub fn new(
        registry: Arc<CategoryRegistry<C, F>>,
        records: D,
        histories: S,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            records,
            histories,
            export_dir,
        }
    }

    /// Exports the record behind one scan to
    /// `<export_dir>/<org_id>/export_<slug>_<timestamp>.xlsx`.
    #[instrument(skip(self, ctx), fields(org_id = %ctx.org.id))]
    pub async fn export(
        &self,
        ctx: &RequestContext,
        scan_history_id: Uuid,
    ) -> ExtoResult<ExportedWorkbook> {
        let tenant = ctx.tenant()?;
        let history = self.histories.get_by_id(&tenant, scan_history_id).await?;
        let category = self.registry.get_by_id(history.category_id).await?;
        let data = self
            .records
            .get_by_id(&tenant, &category.slug, history.category_data_id)
            .await?;

        let workbook = project(&category, &data);
        let path = self.export_dir.join(ctx.org.id.to_string()).join(format!(
            "export_{}_{}.xlsx",
            category.slug,
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        write_workbook(&workbook, &path).await?;

        info!(
            scan_code = %history.scan_code,
            sheets = workbook.sheets.len(),
            path = %path.display(),
            "Export written"
        );
        Ok(ExportedWorkbook {
            path,
            sheets: workbook.sheets.into_iter().map(|s| s.name).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exto_core::models::category::FieldType;
    use serde_json::json;

    fn invoice() -> Category {
        Category {
            id: Uuid::new_v4(),
            name: "Invoice".into(),
            slug: "invoice".into(),
            version: "1".into(),
            primary_field: Some("invoice_no".into()),
            fields: vec![
                Field::new("invoice_no", "Invoice No", FieldType::Text),
                Field::new("total", "Total", FieldType::Currency),
                Field::table(
                    "line_items",
                    "Line Items",
                    vec![
                        Field::new("description", "Description", FieldType::Text),
                        Field::new("qty", "Qty", FieldType::Number),
                        Field::new("amount", "Amount", FieldType::Currency),
                    ],
                ),
            ],
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn record(metadata: Value) -> CategoryData {
        CategoryData {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            format_id: None,
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            raw_data: Map::new(),
            document_paths: Vec::new(),
            organization_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn table_field_becomes_its_own_sheet() {
        let data = record(json!({
            "invoice_no": "INV-1",
            "total": 30,
            "line_items": [
                {"amount": "10.00", "description": "Bolts", "qty": 2},
                {"description": "Nuts", "qty": 1, "amount": "5.00"},
                {"qty": 3, "description": "Washers"}
            ]
        }));
        let workbook = project(&invoice(), &data);
        assert_eq!(workbook.sheets.len(), 2);

        let items = workbook.sheet("line_items").unwrap();
        assert_eq!(items.rows.len(), 4);
        assert_eq!(items.rows[0], ["Description", "Qty", "Amount"]);
        assert_eq!(items.rows[1], ["Bolts", "2", "10.00"]);
        assert_eq!(items.rows[3], ["Washers", "3", ""]);
    }

    #[test]
    fn header_sheet_lists_scalar_fields() {
        let workbook = project(&invoice(), &record(json!({"invoice_no": "INV-1", "total": null})));
        let header = workbook.sheet(HEADER_SHEET).unwrap();
        assert_eq!(header.rows[0], ["Invoice No", "Total"]);
        assert_eq!(header.rows[1], ["INV-1", ""]);

        // no rows when the table value is missing
        assert_eq!(workbook.sheet("line_items").unwrap().rows.len(), 1);
    }

    #[test]
    fn non_object_rows_are_skipped() {
        let data = record(json!({"line_items": ["junk", {"description": "Bolts"}, 7]}));
        let items = project(&invoice(), &data);
        let items = items.sheet("line_items").unwrap();
        assert_eq!(items.rows.len(), 2);
        assert_eq!(items.rows[1], ["Bolts", "", ""]);
    }

    #[test]
    fn sheet_names_are_unique_and_valid() {
        let mut category = invoice();
        category.fields.push(Field::table(
            "Header",
            "Header",
            vec![Field::new("note", "Note", FieldType::Text)],
        ));
        category.fields.push(Field::table(
            "a/very:long*table?field[name]that_overflows",
            "Long",
            vec![Field::new("note", "Note", FieldType::Text)],
        ));
        let workbook = project(&category, &record(json!({})));
        let names: Vec<&str> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names[0], "Header");
        assert_eq!(names[1], "line_items");
        assert_eq!(names[2], "Header_2");
        assert_eq!(names[3], "a_very_long_table_field_name_th");
        assert!(names.iter().all(|n| n.chars().count() <= 31));
    }

    #[test]
    fn repeated_long_names_keep_the_limit() {
        let mut taken = HashSet::new();
        let long = "x".repeat(40);
        assert_eq!(unique_sheet_name(&long, &mut taken), "x".repeat(31));
        let second = unique_sheet_name(&long, &mut taken);
        assert_eq!(second, format!("{}_2", "x".repeat(29)));
        assert_eq!(unique_sheet_name("History", &mut taken), "History_2");
        assert_eq!(unique_sheet_name("''", &mut taken), "Sheet");
    }

    #[test]
    fn workbook_encodes_as_xlsx() {
        let workbook = project(&invoice(), &record(json!({"invoice_no": "INV-1"})));
        let bytes = encode_workbook(&workbook).unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }
}
