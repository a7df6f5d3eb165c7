// 🧭 Region-Table scraper
// One HTML page, one table per nation. Columns are found by header text,
// never by position, so reordered columns still parse.
//
// Primary nation: "Constituency" + "Region" columns.
// Other nations: "Constituency" column only; the nation itself is the region.

use crate::error::{PipelineError, Result};
use crate::http::HttpFetch;
use crate::mappings::{ConstituencyKey, RegionMap};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const CONSTITUENCY_HEADER: &str = "Constituency";
const REGION_HEADER: &str = "Region";

/// Which tables to read, by their `id` attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationTables {
    pub primary: String,
    pub others: Vec<String>,
}

impl Default for NationTables {
    fn default() -> Self {
        NationTables {
            primary: "England".to_string(),
            others: vec!["Scotland".to_string(), "Wales".to_string(), "NI".to_string()],
        }
    }
}

// ============================================================================
// PARSING
// ============================================================================

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| PipelineError::Parse(format!("bad selector '{}': {}", css, e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// One nation table split into header texts and data rows
struct TableRows {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TableRows {
    fn read(document: &Html, table_id: &str) -> Result<Self> {
        let table_selector = selector(&format!(r#"table[id="{}"]"#, table_id))?;
        let row_selector = selector("tr")?;
        let header_selector = selector("th")?;
        let cell_selector = selector("th, td")?;

        let table = document
            .select(&table_selector)
            .next()
            .ok_or_else(|| PipelineError::Parse(format!("no table with id '{}'", table_id)))?;

        let mut rows = table.select(&row_selector);
        let header_row = rows
            .next()
            .ok_or_else(|| PipelineError::Parse(format!("table '{}' has no rows", table_id)))?;

        let headers = header_row.select(&header_selector).map(cell_text).collect();
        let rows = rows
            .map(|row| row.select(&cell_selector).map(cell_text).collect::<Vec<_>>())
            .filter(|cells| !cells.is_empty())
            .collect();

        Ok(TableRows { headers, rows })
    }

    fn column(&self, table_id: &str, header: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|text| text == header)
            .ok_or_else(|| {
                PipelineError::Parse(format!("table '{}' has no '{}' header", table_id, header))
            })
    }

    fn cell<'t>(&'t self, table_id: &str, row: usize, column: usize) -> Result<&'t str> {
        self.rows[row].get(column).map(String::as_str).ok_or_else(|| {
            PipelineError::Parse(format!(
                "row {} of table '{}' has no column {}",
                row + 1,
                table_id,
                column
            ))
        })
    }
}

fn primary_regions(document: &Html, table_id: &str) -> Result<RegionMap> {
    let table = TableRows::read(document, table_id)?;
    let constituency_column = table.column(table_id, CONSTITUENCY_HEADER)?;
    let region_column = table.column(table_id, REGION_HEADER)?;

    let mut regions = RegionMap::new();
    for row in 0..table.rows.len() {
        let key = ConstituencyKey::new(table.cell(table_id, row, constituency_column)?)?;
        regions.insert(key, table.cell(table_id, row, region_column)?)?;
    }

    debug!(table_id, constituencies = regions.len(), "primary nation table parsed");
    Ok(regions)
}

fn nation_regions(document: &Html, table_id: &str) -> Result<RegionMap> {
    let table = TableRows::read(document, table_id)?;
    let constituency_column = table.column(table_id, CONSTITUENCY_HEADER)?;

    let mut regions = RegionMap::new();
    for row in 0..table.rows.len() {
        let key = ConstituencyKey::new(table.cell(table_id, row, constituency_column)?)?;
        regions.insert(key, table_id)?;
    }

    debug!(table_id, constituencies = regions.len(), "nation table parsed");
    Ok(regions)
}

/// Parse the whole region document into one constituency → region map
pub fn parse_region_tables(html: &str, nations: &NationTables) -> Result<RegionMap> {
    let document = Html::parse_document(html);

    let mut regions = primary_regions(&document, &nations.primary)?;
    for nation in &nations.others {
        regions.extend(nation_regions(&document, nation)?);
    }
    Ok(regions)
}

// ============================================================================
// SCRAPER
// ============================================================================

pub struct RegionTableScraper<'a, F: ?Sized> {
    fetcher: &'a F,
    url: String,
    nations: NationTables,
}

impl<'a, F: HttpFetch + ?Sized> RegionTableScraper<'a, F> {
    pub fn new(fetcher: &'a F, url: impl Into<String>, nations: NationTables) -> Self {
        RegionTableScraper {
            fetcher,
            url: url.into(),
            nations,
        }
    }

    pub fn fetch_regions(&self) -> Result<RegionMap> {
        info!(url = %self.url, "scraping constituency regions");
        let response = self.fetcher.get(&self.url, &[])?;
        if !response.is_success() {
            return Err(PipelineError::TransientSource {
                url: self.url.clone(),
                status: response.status,
            });
        }

        let regions = parse_region_tables(&response.body, &self.nations)?;
        info!(constituencies = regions.len(), "constituency regions scraped");
        Ok(regions)
    }
}

// ============================================================================
// TESTS
// ============================================================================
