use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Addresses one remote list on both API surfaces.
///
/// Graph calls use `site_id` / `list_id`; legacy REST calls derive tenant and
/// site from `library_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRef {
    pub library_url: String,
    pub site_id: String,
    pub list_id: String,
}

impl LibraryRef {
    pub fn new(
        library_url: impl Into<String>,
        site_id: impl Into<String>,
        list_id: impl Into<String>,
    ) -> Self {
        Self {
            library_url: library_url.into(),
            site_id: site_id.into(),
            list_id: list_id.into(),
        }
    }
}

/// Allowed values of a choice column, plus any other Graph choice settings
/// (`displayAs`, `allowTextEntry`) carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceSettings {
    pub choices: Vec<String>,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Desired state of one list column.
///
/// Identity is `name`. Type facets (`text`, `personOrGroup`, ...) live in
/// `facets` and are only sent when the column is created; the engine never
/// changes the type of an existing column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Column formatting JSON, serialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_formatter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<ChoiceSettings>,
    #[serde(flatten)]
    pub facets: Map<String, Value>,
}

impl ColumnDefinition {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            custom_formatter: None,
            choice: None,
            facets: Map::new(),
        }
    }

    pub fn with_formatter(mut self, formatter: impl Into<String>) -> Self {
        self.custom_formatter = Some(formatter.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choice = Some(ChoiceSettings {
            choices: choices.into_iter().map(Into::into).collect(),
            settings: Map::new(),
        });
        self
    }

    pub fn with_facet(mut self, key: impl Into<String>, value: Value) -> Self {
        self.facets.insert(key.into(), value);
        self
    }

    /// The formatter to enforce. An empty string counts as no formatter.
    pub fn declared_formatter(&self) -> Option<&str> {
        self.custom_formatter.as_deref().filter(|f| !f.is_empty())
    }

    /// Body for the Graph column-create call. The formatter is not part of it:
    /// Graph cannot set formatters, they are attached afterwards.
    pub fn create_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".into(), Value::String(self.name.clone()));
        body.insert(
            "displayName".into(),
            Value::String(self.display_name.clone()),
        );
        body.insert(
            "description".into(),
            Value::String(self.description.clone()),
        );
        if let Some(choice) = &self.choice {
            let mut settings = choice.settings.clone();
            settings.insert(
                "choices".into(),
                Value::Array(choice.choices.iter().cloned().map(Value::String).collect()),
            );
            body.insert("choice".into(), Value::Object(settings));
        }
        for (key, value) in &self.facets {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body)
    }
}

/// Observed state of an existing list field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteColumn {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub custom_formatter: Option<String>,
    pub choices: Vec<String>,
    /// Opaque OData type tag, echoed back on modification calls.
    pub type_tag: String,
}

/// Minimal modification of an existing field: only changed properties are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnPatch {
    pub type_tag: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub custom_formatter: Option<String>,
    pub choices: Option<Vec<String>>,
}

impl ColumnPatch {
    /// Patch attaching a formatter to a freshly created column.
    pub fn formatter(formatter: impl Into<String>) -> Self {
        Self {
            custom_formatter: Some(formatter.into()),
            ..Default::default()
        }
    }

    /// True when no property would change.
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.custom_formatter.is_some() {
            fields.push("CustomFormatter");
        }
        if self.display_name.is_some() {
            fields.push("Title");
        }
        if self.description.is_some() {
            fields.push("Description");
        }
        if self.choices.is_some() {
            fields.push("Choices");
        }
        fields
    }
}

/// Desired state of a list view.
///
/// `columns` must be present; `remove_columns_if_exists` must be absent.
/// Anything else on the view is left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSpec {
    pub title: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub remove_columns_if_exists: Vec<String>,
}

/// Observed state of a list view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteView {
    pub id: String,
    pub title: String,
    pub is_default: bool,
    pub columns: Vec<String>,
}

/// Observed list content type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteContentType {
    /// `StringId`, used to address the content type on updates
    pub id: String,
    pub name: String,
    pub client_form_custom_formatter: Option<String>,
}

/// A remote file, optionally pinned to a version label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItemRef {
    pub drive_id: String,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl DriveItemRef {
    pub fn new(drive_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            drive_id: drive_id.into(),
            item_id: item_id.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_definition_from_declaration() {
        let def: ColumnDefinition = serde_json::from_value(json!({
            "name": "ptd_publisering",
            "displayName": "Publiseres til",
            "description": "Hvor skal dokumentet publiseres",
            "enforceUniqueValues": false,
            "choice": {
                "allowTextEntry": false,
                "choices": ["Innsida", "Web"],
                "displayAs": "checkBoxes"
            },
            "customFormatter": "{\"elmType\":\"div\"}"
        }))
        .unwrap();

        assert_eq!(def.name, "ptd_publisering");
        assert_eq!(def.choice.as_ref().unwrap().choices, vec!["Innsida", "Web"]);
        assert_eq!(def.facets.get("enforceUniqueValues"), Some(&json!(false)));

        let body = def.create_body();
        assert!(body.get("customFormatter").is_none());
        assert_eq!(body["choice"]["displayAs"], json!("checkBoxes"));
        assert_eq!(body["choice"]["choices"], json!(["Innsida", "Web"]));
        assert_eq!(body["enforceUniqueValues"], json!(false));
    }

    #[test]
    fn test_column_patch_changed_fields() {
        assert!(ColumnPatch::default().is_empty());

        let patch = ColumnPatch {
            type_tag: Some("SP.FieldText".into()),
            description: Some("new".into()),
            ..Default::default()
        };
        assert_eq!(patch.changed_fields(), vec!["Description"]);
        assert!(!ColumnPatch::formatter("{}").is_empty());
    }

    #[test]
    fn test_view_spec_defaults_remove_list() {
        let spec: ViewSpec =
            serde_json::from_value(json!({ "title": "Publisering", "columns": ["A"] })).unwrap();
        assert!(spec.remove_columns_if_exists.is_empty());
    }
}
