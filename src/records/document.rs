use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::fallback::Collections;
use crate::records::{
    EntityKind, FieldValue, FilterOption, RecordKind, SearchField, clean_opt, deserialize_some,
    normalize_tags, require_text,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Contract,
    Invoice,
    Proposal,
    Quote,
    Legal,
    Presentation,
    Marketing,
    Technical,
    Other,
}

impl DocumentCategory {
    pub const ALL: [Self; 9] = [
        Self::Contract,
        Self::Invoice,
        Self::Proposal,
        Self::Quote,
        Self::Legal,
        Self::Presentation,
        Self::Marketing,
        Self::Technical,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Invoice => "invoice",
            Self::Proposal => "proposal",
            Self::Quote => "quote",
            Self::Legal => "legal",
            Self::Presentation => "presentation",
            Self::Marketing => "marketing",
            Self::Technical => "technical",
            Self::Other => "other",
        }
    }
}

/// Kind of record a document is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedToType {
    Lead,
    Contact,
    Deal,
    Project,
    ServiceCall,
}

impl RelatedToType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Contact => "contact",
            Self::Deal => "deal",
            Self::Project => "project",
            Self::ServiceCall => "service_call",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_name: String,
    /// Opaque blob store handle.
    pub file_path: String,
    pub file_type: String,
    pub file_size: i64,
    pub category: DocumentCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    pub related_to_type: Option<RelatedToType>,
    pub related_to_id: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewDocument {
    /// Display name; the file name is used when blank.
    pub name: String,
    pub description: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub file_type: Option<String>,
    pub file_size: i64,
    pub category: Option<DocumentCategory>,
    pub tags: Vec<String>,
    pub related_to_type: Option<RelatedToType>,
    pub related_to_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub category: Option<DocumentCategory>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub related_to_type: Option<Option<RelatedToType>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub related_to_id: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStats {
    pub total: usize,
    pub total_size: i64,
    pub by_category: BTreeMap<DocumentCategory, usize>,
}

/// Document descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentKind;

impl RecordKind for DocumentKind {
    type Record = Document;
    type Draft = NewDocument;
    type Patch = DocumentPatch;
    type Stats = DocumentStats;

    const KIND: EntityKind = EntityKind::Document;
    const SEARCH_FIELDS: &'static [SearchField] = &[
        SearchField::Text("name"),
        SearchField::Text("file_name"),
        SearchField::List("tags"),
    ];
    const EXACT_FILTERS: &'static [(FilterOption, &'static str)] = &[
        (FilterOption::Category, "category"),
        (FilterOption::RelatedToType, "related_to_type"),
        (FilterOption::OwnerId, "created_by"),
    ];

    fn build(
        draft: NewDocument,
        id: Uuid,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Document {
        let file_name = draft.file_name.trim().to_string();
        let name = match draft.name.trim() {
            "" => file_name.clone(),
            name => name.to_string(),
        };
        Document {
            id,
            name,
            description: clean_opt(draft.description),
            file_path: draft.file_path.trim().to_string(),
            file_type: clean_opt(draft.file_type)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            file_name,
            file_size: draft.file_size,
            category: draft.category.unwrap_or(DocumentCategory::Other),
            tags: normalize_tags(draft.tags),
            related_to_type: draft.related_to_type,
            related_to_id: clean_opt(draft.related_to_id),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    fn merge(document: &mut Document, patch: &DocumentPatch) {
        if let Some(name) = &patch.name {
            document.name = name.trim().to_string();
        }
        if let Some(description) = &patch.description {
            document.description = clean_opt(description.clone());
        }
        if let Some(category) = patch.category {
            document.category = category;
        }
        if let Some(tags) = &patch.tags {
            document.tags = normalize_tags(tags.clone());
        }
        if let Some(related_to_type) = patch.related_to_type {
            document.related_to_type = related_to_type;
        }
        if let Some(related_to_id) = &patch.related_to_id {
            document.related_to_id = clean_opt(related_to_id.clone());
        }
    }

    fn validate(document: &Document) -> Result<(), ValidationError> {
        require_text("name", &document.name)?;
        require_text("file_name", &document.file_name)?;
        require_text("file_path", &document.file_path)?;
        if document.file_size < 0 {
            return Err(ValidationError::Negative { field: "file_size" });
        }
        if document.related_to_id.is_some() && document.related_to_type.is_none() {
            return Err(ValidationError::MissingField {
                field: "related_to_type",
            });
        }
        Ok(())
    }

    fn id(document: &Document) -> Uuid {
        document.id
    }

    fn owner(document: &Document) -> Option<&str> {
        document.created_by.as_deref()
    }

    fn created_at(document: &Document) -> DateTime<Utc> {
        document.created_at
    }

    fn updated_at(document: &Document) -> DateTime<Utc> {
        document.updated_at
    }

    fn touch(document: &mut Document, now: DateTime<Utc>) {
        document.updated_at = now;
    }

    fn field<'a>(document: &'a Document, name: &str) -> FieldValue<'a> {
        match name {
            "name" => FieldValue::Text(&document.name),
            "description" => FieldValue::from_opt(document.description.as_deref()),
            "file_name" => FieldValue::Text(&document.file_name),
            "file_type" => FieldValue::Text(&document.file_type),
            "file_size" => FieldValue::Number(Decimal::from(document.file_size)),
            "category" => FieldValue::Text(document.category.as_str()),
            "tags" => FieldValue::List(&document.tags),
            "related_to_type" => {
                FieldValue::from_opt(document.related_to_type.map(RelatedToType::as_str))
            }
            "related_to_id" => FieldValue::from_opt(document.related_to_id.as_deref()),
            "created_by" => FieldValue::from_opt(document.created_by.as_deref()),
            _ => FieldValue::Missing,
        }
    }

    fn stats(documents: &[Document]) -> DocumentStats {
        let mut by_category: BTreeMap<DocumentCategory, usize> =
            DocumentCategory::ALL.into_iter().map(|c| (c, 0)).collect();
        let mut total_size = 0i64;
        for document in documents {
            *by_category.entry(document.category).or_default() += 1;
            total_size = total_size.saturating_add(document.file_size);
        }
        DocumentStats {
            total: documents.len(),
            total_size,
            by_category,
        }
    }

    fn collection(collections: &Collections) -> &Vec<Document> {
        &collections.documents
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Document> {
        &mut collections.documents
    }
}
