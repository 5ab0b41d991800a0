//! Document normalization.
//!
//! Upstream documents are inconsistently shaped: optional fields go missing,
//! relations show up as a bare id, as `{id: ...}`, or not at all, and the
//! image field may be an object, a string URL, or absent. [`normalize`]
//! rewrites a raw document into one shape per type:
//!
//! - documented text fields that are absent become `""`
//! - relation fields become `{"id": ...}` objects or `null`
//! - relation lists become arrays of relation objects
//! - `image` becomes a full image object with every URL key present
//!
//! Unrecognized fields are never touched. The function is pure and
//! idempotent; non-object payloads are returned unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resource::ResourceType;

/// Kind of default applied to a documented field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Absent becomes `""`.
    Text,
    /// Scalar id becomes `{id}`, absent becomes `null`.
    Relation,
    /// Absent becomes `[]`, scalar elements become `{id}`.
    RelationList,
}

const COMMON_FIELDS: &[(&str, FieldKind)] = &[
    ("name", FieldKind::Text),
    ("deck", FieldKind::Text),
    ("description", FieldKind::Text),
    ("api_detail_url", FieldKind::Text),
    ("site_detail_url", FieldKind::Text),
    ("date_added", FieldKind::Text),
    ("date_last_updated", FieldKind::Text),
];

/// Type-specific documented fields, on top of [`COMMON_FIELDS`] and `image`.
pub fn type_fields(resource: ResourceType) -> &'static [(&'static str, FieldKind)] {
    use FieldKind::*;
    match resource {
        ResourceType::Issue => &[
            ("issue_number", Text),
            ("cover_date", Text),
            ("store_date", Text),
            ("volume", Relation),
        ],
        ResourceType::Volume => &[
            ("start_year", Text),
            ("publisher", Relation),
            ("first_issue", Relation),
            ("last_issue", Relation),
            ("issues", RelationList),
        ],
        ResourceType::Character => &[
            ("real_name", Text),
            ("publisher", Relation),
            ("origin", Relation),
            ("first_appeared_in_issue", Relation),
        ],
        ResourceType::Concept | ResourceType::Object | ResourceType::Location => {
            &[("first_appeared_in_issue", Relation)]
        }
        ResourceType::StoryArc | ResourceType::Team => {
            &[("publisher", Relation), ("first_appeared_in_issue", Relation)]
        }
        ResourceType::Publisher => &[
            ("location_address", Text),
            ("location_city", Text),
            ("location_state", Text),
        ],
        ResourceType::Series => &[
            ("start_year", Text),
            ("publisher", Relation),
            ("first_episode", Relation),
            ("last_episode", Relation),
        ],
        ResourceType::Episode => &[("episode_number", Text), ("air_date", Text), ("series", Relation)],
        ResourceType::Person
        | ResourceType::Origin
        | ResourceType::Power
        | ResourceType::Video
        | ResourceType::Chat
        | ResourceType::VideoType
        | ResourceType::VideoCategory => &[],
    }
}

/// True when `field` holds a relation for this type.
pub fn is_relation_field(resource: ResourceType, field: &str) -> bool {
    type_fields(resource)
        .iter()
        .any(|(name, kind)| *name == field && *kind == FieldKind::Relation)
}

/// URL keys of an image object, in download preference order.
pub const IMAGE_URL_FIELDS: [&str; 9] = [
    "original_url",
    "super_url",
    "screen_large_url",
    "medium_url",
    "screen_url",
    "small_url",
    "thumb_url",
    "icon_url",
    "tiny_url",
];

/// Typed view of a document's `image` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub super_url: String,
    #[serde(default)]
    pub screen_large_url: String,
    #[serde(default)]
    pub medium_url: String,
    #[serde(default)]
    pub screen_url: String,
    #[serde(default)]
    pub small_url: String,
    #[serde(default)]
    pub thumb_url: String,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub tiny_url: String,
    #[serde(default)]
    pub image_tags: String,
}

impl ImageSet {
    /// Every size points at the same URL.
    pub fn from_url(url: &str) -> Self {
        let u = url.to_string();
        Self {
            original_url: u.clone(),
            super_url: u.clone(),
            screen_large_url: u.clone(),
            medium_url: u.clone(),
            screen_url: u.clone(),
            small_url: u.clone(),
            thumb_url: u.clone(),
            icon_url: u.clone(),
            tiny_url: u,
            image_tags: String::new(),
        }
    }

    /// Read an image field in any of its upstream shapes.
    ///
    /// Returns `None` for absent, null or non-image values.
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::String(s) if !s.is_empty() => Some(Self::from_url(s)),
            Value::Object(map) => {
                let text = |key: &str| map.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
                Some(Self {
                    original_url: text("original_url"),
                    super_url: text("super_url"),
                    screen_large_url: text("screen_large_url"),
                    medium_url: text("medium_url"),
                    screen_url: text("screen_url"),
                    small_url: text("small_url"),
                    thumb_url: text("thumb_url"),
                    icon_url: text("icon_url"),
                    tiny_url: text("tiny_url"),
                    image_tags: text("image_tags"),
                })
            }
            _ => None,
        }
    }

    fn urls(&self) -> [&str; 9] {
        [
            self.original_url.as_str(),
            self.super_url.as_str(),
            self.screen_large_url.as_str(),
            self.medium_url.as_str(),
            self.screen_url.as_str(),
            self.small_url.as_str(),
            self.thumb_url.as_str(),
            self.icon_url.as_str(),
            self.tiny_url.as_str(),
        ]
    }

    /// Best URL to download, if any is usable.
    pub fn primary_url(&self) -> Option<&str> {
        self.urls().into_iter().find(|u| is_usable_image_url(u))
    }

    /// At least one URL is usable.
    pub fn is_valid(&self) -> bool {
        self.primary_url().is_some()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Absolute http(s) URL that is not one of the upstream placeholder images.
pub fn is_usable_image_url(s: &str) -> bool {
    let Ok(url) = url::Url::parse(s) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let path = url.path();
    !(path.ends_with("blank.png") || path.contains("img_broken"))
}

/// Normalize a raw document for `resource`.
pub fn normalize(resource: ResourceType, doc: Value) -> Value {
    let Value::Object(mut map) = doc else {
        return doc;
    };

    for (field, kind) in COMMON_FIELDS.iter().chain(type_fields(resource)) {
        apply_default(&mut map, field, *kind);
    }
    normalize_image(&mut map);

    Value::Object(map)
}

fn apply_default(map: &mut Map<String, Value>, field: &str, kind: FieldKind) {
    match kind {
        FieldKind::Text => {
            map.entry(field).or_insert_with(|| Value::String(String::new()));
        }
        FieldKind::Relation => {
            let value = map.remove(field).unwrap_or(Value::Null);
            map.insert(field.to_string(), canonical_relation(value));
        }
        FieldKind::RelationList => match map.remove(field) {
            None | Some(Value::Null) => {
                map.insert(field.to_string(), Value::Array(Vec::new()));
            }
            Some(Value::Array(items)) => {
                let items = items.into_iter().map(canonical_relation).collect();
                map.insert(field.to_string(), Value::Array(items));
            }
            Some(other) => {
                map.insert(field.to_string(), other);
            }
        },
    }
}

/// Scalar ids become `{id}`; objects, null and anything else are kept.
pub fn canonical_relation(value: Value) -> Value {
    match value {
        Value::Number(_) | Value::String(_) => {
            let mut obj = Map::new();
            obj.insert("id".to_string(), value);
            Value::Object(obj)
        }
        other => other,
    }
}

fn normalize_image(map: &mut Map<String, Value>) {
    match map.get_mut("image") {
        Some(Value::Object(obj)) => {
            for key in IMAGE_URL_FIELDS {
                let missing = !matches!(obj.get(key), Some(Value::String(_)));
                if missing {
                    obj.insert(key.to_string(), Value::String(String::new()));
                }
            }
            obj.entry("image_tags").or_insert_with(|| Value::String(String::new()));
        }
        Some(Value::String(s)) if !s.is_empty() => {
            let image = ImageSet::from_url(s).to_value();
            map.insert("image".to_string(), image);
        }
        _ => {
            map.insert("image".to_string(), ImageSet::default().to_value());
        }
    }
}

/// Point every image URL equal to `from` at `to`, leaving other keys alone.
pub fn rewrite_image_url(doc: &mut Value, from: &str, to: &str) {
    let Some(Value::Object(image)) = doc.get_mut("image") else {
        return;
    };
    for key in IMAGE_URL_FIELDS {
        if let Some(Value::String(url)) = image.get_mut(key)
            && url.as_str() == from
        {
            *url = to.to_string();
        }
    }
}

/// Keep only the listed top-level keys of a document (`field_list`).
pub fn project(doc: Value, fields: &[String]) -> Value {
    match doc {
        Value::Object(map) if !fields.is_empty() => {
            Value::Object(map.into_iter().filter(|(k, _)| fields.iter().any(|f| f == k)).collect())
        }
        other => other,
    }
}

/// Numeric id carried by a document or relation object, if any.
pub fn document_id(doc: &Value) -> Option<i64> {
    match doc.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_defaults() {
        let doc = normalize(ResourceType::Issue, json!({"id": 12345, "name": "X"}));
        assert_eq!(doc["id"], 12345);
        assert_eq!(doc["name"], "X");
        assert_eq!(doc["issue_number"], "");
        assert_eq!(doc["volume"], Value::Null);
        assert_eq!(doc["image"]["small_url"], "");
        assert_eq!(doc["image"]["original_url"], "");
    }

    #[test]
    fn test_relation_shapes() {
        let bare = normalize(ResourceType::Issue, json!({"id": 1, "volume": 796}));
        assert_eq!(bare["volume"], json!({"id": 796}));

        let obj = normalize(ResourceType::Issue, json!({"id": 1, "volume": {"id": 796, "name": "Batman"}}));
        assert_eq!(obj["volume"], json!({"id": 796, "name": "Batman"}));

        let text = normalize(ResourceType::Issue, json!({"id": 1, "volume": "796"}));
        assert_eq!(text["volume"], json!({"id": "796"}));
    }

    #[test]
    fn test_relation_list() {
        let doc = normalize(ResourceType::Volume, json!({"id": 1, "issues": [5, {"id": 6, "issue_number": "2"}]}));
        assert_eq!(doc["issues"], json!([{"id": 5}, {"id": 6, "issue_number": "2"}]));

        let empty = normalize(ResourceType::Volume, json!({"id": 1}));
        assert_eq!(empty["issues"], json!([]));
    }

    #[test]
    fn test_image_string_becomes_object() {
        let doc = normalize(ResourceType::Character, json!({"id": 1, "image": "https://x.test/a.jpg"}));
        assert_eq!(doc["image"]["medium_url"], "https://x.test/a.jpg");
        assert_eq!(doc["image"]["tiny_url"], "https://x.test/a.jpg");
    }

    #[test]
    fn test_image_object_keeps_extra_keys() {
        let doc = normalize(
            ResourceType::Character,
            json!({"id": 1, "image": {"small_url": "https://x.test/s.jpg", "custom": 7}}),
        );
        assert_eq!(doc["image"]["small_url"], "https://x.test/s.jpg");
        assert_eq!(doc["image"]["super_url"], "");
        assert_eq!(doc["image"]["custom"], 7);
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let doc = normalize(ResourceType::Publisher, json!({"id": 3, "aliases": "Marvel Comics", "extra": [1, 2]}));
        assert_eq!(doc["aliases"], "Marvel Comics");
        assert_eq!(doc["extra"], json!([1, 2]));
    }

    #[test]
    fn test_null_name_kept() {
        let doc = normalize(ResourceType::Issue, json!({"id": 1, "name": null}));
        assert_eq!(doc["name"], Value::Null);
    }

    #[test]
    fn test_idempotent_for_every_type() {
        let samples = [
            json!({}),
            json!({"id": 1}),
            json!({"id": 1, "volume": 2, "publisher": "3", "issues": [4, {"id": 5}], "image": "https://x.test/i.png"}),
            json!({"id": 1, "first_appeared_in_issue": {"id": 9}, "image": {"small_url": ""}, "series": null}),
            json!({"id": 1, "image": 42, "issues": "bogus", "origin": true}),
        ];
        for resource in ResourceType::ALL {
            for sample in &samples {
                let once = normalize(resource, sample.clone());
                let twice = normalize(resource, once.clone());
                assert_eq!(once, twice, "normalize not idempotent for {resource}");
            }
        }
    }

    #[test]
    fn test_non_object_passthrough() {
        assert_eq!(normalize(ResourceType::Issue, json!([1, 2])), json!([1, 2]));
        assert_eq!(normalize(ResourceType::Issue, json!("x")), json!("x"));
    }

    #[test]
    fn test_image_validity() {
        assert!(!ImageSet::default().is_valid());
        assert!(ImageSet::from_url("https://x.test/a.jpg").is_valid());
        assert!(!ImageSet::from_url("https://x.test/uploads/6373148-blank.png").is_valid());
        assert!(!ImageSet::from_url("not a url").is_valid());

        let partial = ImageSet { thumb_url: "https://x.test/t.jpg".into(), ..Default::default() };
        assert_eq!(partial.primary_url(), Some("https://x.test/t.jpg"));
    }

    #[test]
    fn test_image_from_value_shapes() {
        assert_eq!(ImageSet::from_value(None), None);
        assert_eq!(ImageSet::from_value(Some(&Value::Null)), None);
        assert_eq!(ImageSet::from_value(Some(&json!(""))), None);
        assert!(ImageSet::from_value(Some(&json!("https://x.test/a.jpg"))).unwrap().is_valid());
        assert!(!ImageSet::from_value(Some(&json!({"small_url": ""}))).unwrap().is_valid());
    }

    #[test]
    fn test_rewrite_image_url() {
        let mut doc = normalize(
            ResourceType::Issue,
            json!({"id": 1, "image": {"small_url": "https://x.test/a.jpg", "thumb_url": "https://x.test/b.jpg"}}),
        );
        rewrite_image_url(&mut doc, "https://x.test/a.jpg", "http://local/images/abc");
        assert_eq!(doc["image"]["small_url"], "http://local/images/abc");
        assert_eq!(doc["image"]["thumb_url"], "https://x.test/b.jpg");
    }

    #[test]
    fn test_project() {
        let doc = json!({"id": 1, "name": "X", "deck": "d"});
        let fields = vec!["id".to_string(), "name".to_string()];
        assert_eq!(project(doc.clone(), &fields), json!({"id": 1, "name": "X"}));
        assert_eq!(project(doc.clone(), &[]), doc);
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id(&json!({"id": 5})), Some(5));
        assert_eq!(document_id(&json!({"id": "6"})), Some(6));
        assert_eq!(document_id(&json!({"id": "x"})), None);
        assert_eq!(document_id(&json!({})), None);
    }

    #[test]
    fn test_relation_field_lookup() {
        assert!(is_relation_field(ResourceType::Issue, "volume"));
        assert!(!is_relation_field(ResourceType::Issue, "name"));
        assert!(!is_relation_field(ResourceType::Volume, "issues"));
    }
}
