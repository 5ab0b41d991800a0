//! Resource-type tables.
//!
//! Every catalog entity kind is a variant of [`ResourceType`]. The type's
//! singular name, plural form, upstream numeric prefix and store table are
//! looked up from one enum-keyed table, shared by the route parser, the
//! upstream client and the structured store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A catalog entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Issue,
    Volume,
    Character,
    Concept,
    Object,
    Origin,
    Person,
    Power,
    StoryArc,
    Team,
    Location,
    Video,
    Publisher,
    Series,
    Episode,
    Chat,
    VideoType,
    VideoCategory,
}

/// Static routing data for one resource type.
#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub plural: &'static str,
    /// Numeric code embedded in upstream detail URLs. Only used for
    /// upstream routing, never as a storage key.
    pub prefix: Option<u32>,
    pub table: &'static str,
}

impl ResourceType {
    /// All types, in table order.
    pub const ALL: [ResourceType; 18] = [
        ResourceType::Issue,
        ResourceType::Volume,
        ResourceType::Character,
        ResourceType::Concept,
        ResourceType::Object,
        ResourceType::Origin,
        ResourceType::Person,
        ResourceType::Power,
        ResourceType::StoryArc,
        ResourceType::Team,
        ResourceType::Location,
        ResourceType::Video,
        ResourceType::Publisher,
        ResourceType::Series,
        ResourceType::Episode,
        ResourceType::Chat,
        ResourceType::VideoType,
        ResourceType::VideoCategory,
    ];

    pub const fn info(self) -> TypeInfo {
        const fn t(name: &'static str, plural: &'static str, prefix: Option<u32>, table: &'static str) -> TypeInfo {
            TypeInfo { name, plural, prefix, table }
        }

        match self {
            ResourceType::Issue => t("issue", "issues", Some(4000), "cv_issue"),
            ResourceType::Volume => t("volume", "volumes", Some(4050), "cv_volume"),
            ResourceType::Character => t("character", "characters", Some(4005), "cv_character"),
            ResourceType::Concept => t("concept", "concepts", Some(4015), "cv_concept"),
            ResourceType::Object => t("object", "objects", Some(4020), "cv_object"),
            ResourceType::Origin => t("origin", "origins", Some(4025), "cv_origin"),
            ResourceType::Person => t("person", "people", Some(4040), "cv_person"),
            ResourceType::Power => t("power", "powers", Some(4027), "cv_power"),
            ResourceType::StoryArc => t("story_arc", "story_arcs", Some(4045), "cv_story_arc"),
            ResourceType::Team => t("team", "teams", Some(4060), "cv_team"),
            ResourceType::Location => t("location", "locations", Some(4023), "cv_location"),
            ResourceType::Video => t("video", "videos", Some(2300), "cv_video"),
            ResourceType::Publisher => t("publisher", "publishers", Some(4010), "cv_publisher"),
            ResourceType::Series => t("series", "series", Some(4070), "cv_series"),
            ResourceType::Episode => t("episode", "episodes", Some(4075), "cv_episode"),
            ResourceType::Chat => t("chat", "chats", None, "cv_chat"),
            ResourceType::VideoType => t("video_type", "video_types", None, "cv_video_type"),
            ResourceType::VideoCategory => t("video_category", "video_categories", None, "cv_video_category"),
        }
    }

    pub const fn name(self) -> &'static str {
        self.info().name
    }

    pub const fn plural(self) -> &'static str {
        self.info().plural
    }

    pub const fn prefix(self) -> Option<u32> {
        self.info().prefix
    }

    pub const fn table(self) -> &'static str {
        self.info().table
    }

    /// Look up a type by its singular name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Look up a type by its plural (list route) form.
    pub fn from_plural(plural: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.plural() == plural)
    }

    /// Upstream API path for a single record, e.g. `/api/issue/4000-12345/`.
    pub fn detail_path(self, id: i64) -> String {
        match self.prefix() {
            Some(prefix) => format!("/api/{}/{prefix}-{id}/", self.name()),
            None => format!("/api/{}/{id}/", self.name()),
        }
    }

    /// Upstream API path for a listing, e.g. `/api/issues/`.
    pub fn list_path(self) -> String {
        format!("/api/{}/", self.plural())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
