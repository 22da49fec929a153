//! Tagged constructors for sources and transforms
//!
//! A variant is a JSON object whose `type` field names a registered
//! constructor; the remaining fields are its parameters.

use std::collections::BTreeMap;
use std::path::PathBuf;

use nanodata_store::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::source::DataSource;
use crate::sources::{GeneratorSource, HubSource, LocalSource, UrlSource};
use crate::transform::DataTransform;
use crate::transforms::{DropColumns, ResizeImages, SetMimeType};

pub const TAG_KEY: &str = "type";

pub type Constructor<T> = fn(serde_json::Value) -> Result<T>;

/// Explicit tag → constructor table.
pub struct VariantRegistry<T> {
    kind: &'static str,
    constructors: BTreeMap<String, Constructor<T>>,
}

impl<T> VariantRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            constructors: BTreeMap::new(),
        }
    }

    /// Register a constructor; fails if the tag is taken.
    pub fn register(&mut self, tag: &str, constructor: Constructor<T>) -> Result<()> {
        if self.constructors.contains_key(tag) {
            return Err(Error::already_exists(self.kind, tag));
        }
        self.constructors.insert(tag.to_string(), constructor);
        Ok(())
    }

    /// Table pre-filled with built-in constructors. A repeated tag keeps the
    /// first constructor and is logged.
    fn with_builtins<const N: usize>(
        kind: &'static str,
        builtins: [(&str, Constructor<T>); N],
    ) -> Self {
        let mut registry = Self::new(kind);
        for (tag, constructor) in builtins {
            if let Err(e) = registry.register(tag, constructor) {
                log::warn!("skipping built-in {kind}: {e}");
            }
        }
        registry
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build a value from a tagged JSON object.
    pub fn build(&self, value: serde_json::Value) -> Result<T> {
        let serde_json::Value::Object(mut fields) = value else {
            return Err(Error::Config(format!("{} must be a table", self.kind)));
        };
        let tag = match fields.remove(TAG_KEY) {
            Some(serde_json::Value::String(tag)) => tag,
            _ => {
                return Err(Error::Config(format!(
                    "{} is missing a string `{TAG_KEY}` field",
                    self.kind
                )));
            }
        };
        let Some(constructor) = self.constructors.get(&tag) else {
            let known = self.tags().collect::<Vec<_>>().join(", ");
            return Err(Error::Config(format!(
                "unknown {} type '{tag}' (known: {known})",
                self.kind
            )));
        };
        constructor(serde_json::Value::Object(fields))
    }
}

fn params<P: DeserializeOwned>(value: serde_json::Value) -> Result<P> {
    serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LocalParams {
    path: PathBuf,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Registry of the built-in sources: `local`, `url`, `generator`, `hub`.
pub fn builtin_sources() -> VariantRegistry<Box<dyn DataSource>> {
    let builtins: [(&str, Constructor<Box<dyn DataSource>>); 4] = [
        ("local", |v| {
            let p: LocalParams = params(v)?;
            Ok(Box::new(LocalSource::new(p.path, p.mime_type)?))
        }),
        ("url", |v| Ok(Box::new(params::<UrlSource>(v)?))),
        ("generator", |v| Ok(Box::new(params::<GeneratorSource>(v)?))),
        ("hub", |v| Ok(Box::new(params::<HubSource>(v)?))),
    ];
    VariantRegistry::with_builtins("source", builtins)
}

/// Registry of the built-in transforms: `drop_columns`, `set_mime_type`,
/// `resize_images`.
pub fn builtin_transforms() -> VariantRegistry<Box<dyn DataTransform>> {
    let builtins: [(&str, Constructor<Box<dyn DataTransform>>); 3] = [
        ("drop_columns", |v| Ok(Box::new(params::<DropColumns>(v)?))),
        ("set_mime_type", |v| Ok(Box::new(params::<SetMimeType>(v)?))),
        ("resize_images", |v| {
            let resize: ResizeImages = params(v)?;
            resize.validate()?;
            Ok(Box::new(resize))
        }),
    ];
    VariantRegistry::with_builtins("transform", builtins)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builds_url_source() {
        let source = builtin_sources()
            .build(json!({"type": "url", "url": "https://example.com/a.parquet"}))
            .unwrap();
        let expected = UrlSource::new("https://example.com/a.parquet");
        assert_eq!(source.content_hash(), expected.content_hash());
    }

    #[test]
    fn builds_transforms() {
        let registry = builtin_transforms();
        let drop = registry
            .build(json!({"type": "drop_columns", "columns": ["path"]}))
            .unwrap();
        assert_eq!(drop.content_hash(), DropColumns::new(["path"]).content_hash());

        let resize = registry
            .build(json!({"type": "resize_images", "width": 16, "height": 16}))
            .unwrap();
        assert_eq!(
            resize.content_hash(),
            ResizeImages::new(16, 16).unwrap().content_hash()
        );
    }

    #[test]
    fn unknown_tag_lists_known() {
        let err = builtin_transforms()
            .build(json!({"type": "shuffle"}))
            .err().unwrap();
        let msg = err.to_string();
        assert!(msg.contains("shuffle"));
        assert!(msg.contains("drop_columns"));
    }

    #[test]
    fn missing_tag_and_bad_params() {
        let registry = builtin_sources();
        assert!(matches!(
            registry.build(json!({"url": "x"})),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            registry.build(json!({"type": "url"})),
            Err(Error::Config(_))
        ));
        assert!(matches!(registry.build(json!("url")), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_resize_rejected() {
        let err = builtin_transforms()
            .build(json!({"type": "resize_images", "width": 0, "height": 8}))
            .err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn builtin_tags() {
        assert_eq!(
            builtin_sources().tags().collect::<Vec<_>>(),
            vec!["generator", "hub", "local", "url"]
        );
        assert_eq!(
            builtin_transforms().tags().collect::<Vec<_>>(),
            vec!["drop_columns", "resize_images", "set_mime_type"]
        );
    }

    #[test]
    fn repeated_builtin_keeps_first() {
        let builtins: [(&str, Constructor<u32>); 2] = [("one", |_| Ok(1)), ("one", |_| Ok(2))];
        let registry = VariantRegistry::with_builtins("number", builtins);
        assert_eq!(registry.tags().count(), 1);
        assert_eq!(registry.build(json!({"type": "one"})).unwrap(), 1);
    }

    #[test]
    fn duplicate_tag_rejected() {
        let mut registry = builtin_transforms();
        let err = registry
            .register("drop_columns", |v| Ok(Box::new(params::<DropColumns>(v)?)))
            .unwrap_err();
        assert!(err.is_already_exists());
    }
}
