use super::{selector, Extraction, Extractor, TextCleaner};
use crate::error::Result;
use scrapo_browser::{evaluate_as, PageHandle};
use scrapo_core::{ExtractionType, Field, Record};
use scraper::{ElementRef, Html, Selector};

const ITEM: &str = ".artdeco-list .artdeco-list__item";
const NAME_LINK: &str = ".artdeco-entity-lockup__title a";
const INDUSTRY: &str = ".artdeco-entity-lockup__subtitle span[data-anonymize='industry']";
const EMPLOYEES: &str = "a.li-i18n-linkto._view-all-employees_1derdc";
const ABOUT: &str = "dd.t-12.t-black--light.mb3 div span:nth-child(2)";
const DESIGNATION: &str = ".artdeco-entity-lockup__subtitle span[data-anonymize='title']";
const ORGANIZATION: &str = ".artdeco-entity-lockup__subtitle a[data-anonymize='company-name']";
const LOCATION: &str = ".artdeco-entity-lockup__caption span[data-anonymize='location']";

const SEE_MORE: &str = "…see more";

const SNAPSHOT_SCRIPT: &str = "document.documentElement.outerHTML";

/// Extracts one [`Record`] per entity card on an account search page.
#[derive(Debug, Clone)]
pub struct AccountListExtractor {
    item: Selector,
    name_link: Selector,
    industry: Selector,
    employees: Selector,
    about: Selector,
    designation: Selector,
    organization: Selector,
    location: Selector,
    cleaner: TextCleaner,
}

impl AccountListExtractor {
    /// Compile the card selectors.
    pub fn new() -> Result<Self> {
        Ok(Self {
            item: selector(ITEM)?,
            name_link: selector(NAME_LINK)?,
            industry: selector(INDUSTRY)?,
            employees: selector(EMPLOYEES)?,
            about: selector(ABOUT)?,
            designation: selector(DESIGNATION)?,
            organization: selector(ORGANIZATION)?,
            location: selector(LOCATION)?,
            cleaner: TextCleaner::new()?,
        })
    }

    /// Parse a page snapshot. Items with no recognizable fields still yield
    /// an (empty) record so the count matches the cards on the page.
    #[must_use]
    pub fn parse(&self, html: &str) -> Vec<Record> {
        let document = Html::parse_document(html);
        document
            .select(&self.item)
            .map(|item| self.parse_item(item))
            .collect()
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Record {
        let mut record = Record::new();

        let name_link = item.select(&self.name_link).next();
        record.insert(Field::Name, name_link.and_then(|a| self.cleaner.text(a)).as_deref());
        record.insert(Field::ProfileUrl, self.href(name_link).as_deref());

        let text = |sel: &Selector| self.cleaner.text_at(item, sel);
        record.insert(Field::Industry, text(&self.industry).as_deref());
        record.insert(Field::Employees, text(&self.employees).as_deref());
        record.insert(
            Field::About,
            text(&self.about)
                .map(|about| about.replacen(SEE_MORE, "", 1))
                .as_deref(),
        );
        record.insert(Field::Designation, text(&self.designation).as_deref());

        let organization = item.select(&self.organization).next();
        record.insert(
            Field::Organization,
            organization.and_then(|a| self.cleaner.text(a)).as_deref(),
        );
        record.insert(Field::OrganizationUrl, self.href(organization).as_deref());

        record.insert(Field::Location, text(&self.location).as_deref());
        record
    }

    fn href(&self, anchor: Option<ElementRef<'_>>) -> Option<String> {
        anchor
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| self.cleaner.resolve(href))
    }
}

#[async_trait::async_trait]
impl Extractor for AccountListExtractor {
    fn extraction_type(&self) -> ExtractionType {
        ExtractionType::Accounts
    }

    async fn extract(&self, page: &dyn PageHandle) -> Result<Extraction> {
        let html: String = evaluate_as(page, SNAPSHOT_SCRIPT).await?;
        let records = self.parse(&html);
        tracing::debug!(records = records.len(), "Parsed account list");
        Ok(Extraction::Records(records))
    }
}
