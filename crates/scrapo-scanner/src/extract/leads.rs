use super::{selector, Extraction, Extractor, TextCleaner};
use crate::error::Result;
use scrapo_browser::{evaluate_as, PageHandle};
use scrapo_core::{ExtractionType, Row, TableSnapshot};
use scraper::{ElementRef, Html, Selector};

/// Synthesized column holding the lead's profile link.
pub const PROFILE_URL_COLUMN: &str = "Profile URL";
/// Synthesized column holding the lead's job title.
pub const DESIGNATION_COLUMN: &str = "Designation";
/// Page column whose cell is replaced by its button label.
pub const OUTREACH_COLUMN: &str = "Outreach activity";

/// Cell values used when a lookup inside a row finds nothing.
pub const NAME_NOT_FOUND: &str = "Name not found";
#[allow(missing_docs)]
pub const LINK_NOT_FOUND: &str = "Link not found";
#[allow(missing_docs)]
pub const DESIGNATION_NOT_FOUND: &str = "Designation not found";
#[allow(missing_docs)]
pub const OUTREACH_NOT_FOUND: &str = "Outreach Activity Not Found";

const SNAPSHOT_SCRIPT: &str = r"(() => {
    const table = document.querySelector('table');
    return table ? table.outerHTML : null;
})()";

/// Extracts the lead list table as header plus positional rows.
///
/// Two columns that the page only shows inside the name cell are pulled out
/// and inserted after the name: the profile link and the job title.
#[derive(Debug, Clone)]
pub struct LeadTableExtractor {
    table: Selector,
    header_cell: Selector,
    body_row: Selector,
    cell: Selector,
    name: Selector,
    link: Selector,
    designation: Selector,
    outreach: Selector,
    cleaner: TextCleaner,
}

impl LeadTableExtractor {
    /// Compile the table selectors.
    pub fn new() -> Result<Self> {
        Ok(Self {
            table: selector("table")?,
            header_cell: selector("thead th")?,
            body_row: selector("tbody tr")?,
            cell: selector("td")?,
            name: selector("a span")?,
            link: selector("a")?,
            designation: selector("div[data-anonymize='job-title']")?,
            outreach: selector("button span.lists-table__outreach-activity-text")?,
            cleaner: TextCleaner::new()?,
        })
    }

    /// Parse a table's HTML. No table yields an empty snapshot.
    #[must_use]
    pub fn parse(&self, html: &str) -> TableSnapshot {
        let document = Html::parse_document(html);
        let Some(table) = document.select(&self.table).next() else {
            return TableSnapshot::default();
        };

        let mut header: Row = table
            .select(&self.header_cell)
            .map(|th| self.cleaner.clean(&th.text().collect::<String>()))
            .collect();

        // Position of the outreach column among the page's own cells.
        let outreach_cell = header.iter().position(|h| h == OUTREACH_COLUMN);

        insert_at(&mut header, 1, PROFILE_URL_COLUMN.to_string());
        insert_at(&mut header, 2, DESIGNATION_COLUMN.to_string());

        let rows = table
            .select(&self.body_row)
            .map(|tr| self.parse_row(tr, outreach_cell))
            .collect();

        TableSnapshot { header, rows }
    }

    fn parse_row(&self, tr: ElementRef<'_>, outreach_cell: Option<usize>) -> Row {
        let cells: Vec<ElementRef<'_>> = tr.select(&self.cell).collect();
        let first = cells.first().copied();

        let name = first
            .and_then(|cell| self.cleaner.text_at(cell, &self.name))
            .unwrap_or_else(|| NAME_NOT_FOUND.to_string());
        let link = first
            .and_then(|cell| cell.select(&self.link).next())
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| self.cleaner.resolve(href))
            .unwrap_or_else(|| LINK_NOT_FOUND.to_string());
        let designation = first
            .and_then(|cell| self.cleaner.text_at(cell, &self.designation))
            .unwrap_or_else(|| DESIGNATION_NOT_FOUND.to_string());
        let outreach = outreach_cell
            .and_then(|i| cells.get(i))
            .and_then(|cell| self.cleaner.text_at(*cell, &self.outreach))
            .unwrap_or_else(|| OUTREACH_NOT_FOUND.to_string());

        let mut row: Row = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| match i {
                0 => name.clone(),
                i if Some(i) == outreach_cell => outreach.clone(),
                _ => self.cleaner.clean(&cell.text().collect::<String>()),
            })
            .collect();

        insert_at(&mut row, 1, link);
        insert_at(&mut row, 2, designation);
        row
    }
}

/// `Vec::insert` that appends instead of panicking past the end.
fn insert_at(row: &mut Row, index: usize, value: String) {
    let index = index.min(row.len());
    row.insert(index, value);
}

#[async_trait::async_trait]
impl Extractor for LeadTableExtractor {
    fn extraction_type(&self) -> ExtractionType {
        ExtractionType::Leads
    }

    async fn extract(&self, page: &dyn PageHandle) -> Result<Extraction> {
        let html: Option<String> = evaluate_as(page, SNAPSHOT_SCRIPT).await?;
        let snapshot = match html {
            Some(html) => self.parse(&html),
            None => {
                tracing::info!("No table found on page");
                TableSnapshot::default()
            }
        };
        tracing::debug!(rows = snapshot.rows.len(), "Parsed lead table");
        Ok(Extraction::Table(snapshot))
    }
}
