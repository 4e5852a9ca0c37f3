//! Plain TypeScript interfaces inferred from a JSON value.
//!
//! Every object becomes an interface named after the key it was found under.
//! Arrays of objects are merged into one interface whose keys are optional
//! when some elements lack them. Interfaces with identical bodies are emitted
//! once and shared.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde_json::{Map, Value};

/// Converts JSON values into TypeScript interface declarations.
#[derive(Debug, Default)]
pub struct InterfaceConverter {
    /// Interfaces in the order their bodies were completed.
    declarations: Vec<(String, String)>,
    by_body: HashMap<String, String>,
    names: HashSet<String>,
}

impl InterfaceConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `value` into a TypeScript module. The root interface is named
    /// after `root_name` and is the only exported one.
    pub fn convert(root_name: &str, value: &Value) -> String {
        let mut converter = Self::new();
        // The root keeps its name even if a nested key shares it, and is
        // never merged with a nested interface of the same shape.
        let root = pascal_case(root_name);
        converter.names.insert(root.clone());
        let body = match value {
            Value::Object(map) => converter.object_body(&[map]),
            other => format!("  value: {};\n", converter.type_of(root_name, other)),
        };
        converter.declarations.push((root.clone(), body));
        converter.render(&root)
    }

    fn render(&self, root: &str) -> String {
        let ordered = self
            .declarations
            .iter()
            .filter(|(name, _)| name == root)
            .chain(self.declarations.iter().filter(|(name, _)| name != root));

        let mut out = String::new();
        for (index, (name, body)) in ordered.enumerate() {
            if index == 0 {
                out.push_str("export ");
            } else {
                out.push('\n');
            }
            out.push_str(&format!("interface {} {{\n{}}}\n", name, body));
        }
        out
    }

    fn type_of(&mut self, hint: &str, value: &Value) -> String {
        match value {
            Value::Null => "any".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Number(_) => "number".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Object(map) => self.interface_for(hint, &[map]),
            Value::Array(items) => self.array_type(hint, items),
        }
    }

    fn array_type(&mut self, hint: &str, items: &[Value]) -> String {
        if items.is_empty() {
            return "any[]".to_string();
        }

        let element_hint = singular(hint);
        let objects: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();

        let mut members = BTreeSet::new();
        if !objects.is_empty() {
            members.insert(self.interface_for(&element_hint, &objects));
        }
        for item in items.iter().filter(|item| !item.is_object()) {
            members.insert(self.type_of(&element_hint, item));
        }

        let members: Vec<String> = members.into_iter().collect();
        match members.as_slice() {
            [single] => format!("{}[]", single),
            _ => format!("({})[]", members.join(" | ")),
        }
    }

    /// Interface covering all `objects`, returning its (possibly shared) name.
    fn interface_for(&mut self, hint: &str, objects: &[&Map<String, Value>]) -> String {
        let body = self.object_body(objects);
        if let Some(existing) = self.by_body.get(&body) {
            return existing.clone();
        }
        let name = self.unique_name(hint);
        self.by_body.insert(body.clone(), name.clone());
        self.declarations.push((name.clone(), body));
        name
    }

    fn object_body(&mut self, objects: &[&Map<String, Value>]) -> String {
        let mut fields: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
        for object in objects {
            for (key, value) in object.iter() {
                fields.entry(key.as_str()).or_default().push(value);
            }
        }

        let mut body = String::new();
        for (key, values) in &fields {
            let optional = values.len() < objects.len();
            let ty = self.field_type(&pascal_case(key), values);
            body.push_str(&format!(
                "  {}{}: {};\n",
                property_name(key),
                if optional { "?" } else { "" },
                ty
            ));
        }
        body
    }

    fn field_type(&mut self, hint: &str, values: &[&Value]) -> String {
        let objects: Vec<&Map<String, Value>> =
            values.iter().filter_map(|v| v.as_object()).collect();

        let mut members = BTreeSet::new();
        if !objects.is_empty() {
            members.insert(self.interface_for(hint, &objects));
        }
        for value in values.iter().filter(|v| !v.is_object()) {
            members.insert(self.type_of(hint, value));
        }
        members.into_iter().collect::<Vec<_>>().join(" | ")
    }

    fn unique_name(&mut self, hint: &str) -> String {
        let base = pascal_case(hint);
        let mut name = base.clone();
        let mut suffix = 2;
        while !self.names.insert(name.clone()) {
            name = format!("{}{}", base, suffix);
            suffix += 1;
        }
        name
    }
}

/// `gallery_items`, `gallery-items` and `/gallery/{items}` all become
/// `GalleryItems`.
pub fn pascal_case(s: &str) -> String {
    let mut result = String::new();
    for part in s.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            result.push(first.to_ascii_uppercase());
            result.extend(chars);
        }
    }

    if result.is_empty() {
        "Type".to_string()
    } else if result.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Type{}", result)
    } else {
        result
    }
}

fn singular(s: &str) -> String {
    if let Some(stem) = s.strip_suffix("ies") {
        format!("{}y", stem)
    } else if s.len() > 1 && s.ends_with('s') && !s.ends_with("ss") {
        s[..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn property_name(key: &str) -> String {
    let mut chars = key.chars();
    let is_identifier = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_identifier {
        key.to_string()
    } else {
        serde_json::to_string(key).unwrap_or_else(|_| format!("\"{}\"", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("gallery_items"), "GalleryItems");
        assert_eq!(pascal_case("gallery-api"), "GalleryApi");
        assert_eq!(pascal_case("/galleries/{gallery_id}"), "GalleriesGalleryId");
        assert_eq!(pascal_case("200"), "Type200");
        assert_eq!(pascal_case(""), "Type");
    }

    #[test]
    fn test_singular() {
        assert_eq!(singular("Galleries"), "Gallery");
        assert_eq!(singular("Photos"), "Photo");
        assert_eq!(singular("Access"), "Access");
    }

    #[test]
    fn test_flat_object() {
        let ts = InterfaceConverter::convert(
            "backend",
            &json!({ "title": "Gallery API", "version": 3, "beta": false, "license": null }),
        );
        assert_eq!(
            ts,
            "export interface Backend {\n  beta: boolean;\n  license: any;\n  title: string;\n  version: number;\n}\n"
        );
    }

    #[test]
    fn test_nested_objects_named_after_keys() {
        let ts = InterfaceConverter::convert(
            "backend",
            &json!({ "info": { "title": "Gallery API" }, "servers": [{ "url": "/api" }] }),
        );
        assert!(ts.starts_with("export interface Backend {\n  info: Info;\n  servers: Server[];\n}\n"));
        assert!(ts.contains("\ninterface Info {\n  title: string;\n}\n"));
        assert!(ts.contains("\ninterface Server {\n  url: string;\n}\n"));
        assert_eq!(ts.matches("export ").count(), 1);
    }

    #[test]
    fn test_array_elements_merge_with_optional_keys() {
        let ts = InterfaceConverter::convert(
            "root",
            &json!({ "photos": [ { "id": 1, "caption": "dusk" }, { "id": 2 } ] }),
        );
        assert!(ts.contains("interface Photo {\n  caption?: string;\n  id: number;\n}\n"));
    }

    #[test]
    fn test_mixed_arrays_become_unions() {
        let ts = InterfaceConverter::convert("root", &json!({ "tags": ["a", 1, "b"], "empty": [] }));
        assert!(ts.contains("  empty: any[];\n"));
        assert!(ts.contains("  tags: (number | string)[];\n"));
    }

    #[test]
    fn test_identical_shapes_emitted_once() {
        let ts = InterfaceConverter::convert(
            "root",
            &json!({
                "owner": { "id": 1, "name": "a" },
                "editor": { "id": 2, "name": "b" }
            }),
        );
        assert_eq!(ts.matches("interface ").count(), 2);
        assert!(ts.contains("  editor: Editor;\n  owner: Editor;\n"));
    }

    #[test]
    fn test_name_collisions_get_suffix() {
        let ts = InterfaceConverter::convert(
            "root",
            &json!({
                "a": { "item": { "x": 1 } },
                "b": { "item": { "y": "z" } }
            }),
        );
        assert!(ts.contains("interface Item {"));
        assert!(ts.contains("interface Item2 {"));
    }

    #[test]
    fn test_root_keeps_schema_name_over_nested_key() {
        let ts = InterfaceConverter::convert("info", &json!({ "info": { "title": "a" } }));
        assert!(ts.starts_with("export interface Info {\n  info: Info2;\n}\n"));
        assert!(ts.contains("\ninterface Info2 {\n  title: string;\n}\n"));
    }

    #[test]
    fn test_recursive_shape_exports_root_by_schema_name() {
        let ts = InterfaceConverter::convert(
            "node",
            &json!({ "id": 1, "parent": { "id": 2, "parent": { "id": 3 } } }),
        );
        assert!(ts.starts_with("export interface Node {\n  id: number;\n  parent: Parent2;\n}\n"));
        assert!(ts.contains("\ninterface Parent2 {\n  id: number;\n  parent: Parent;\n}\n"));
        assert!(ts.contains("\ninterface Parent {\n  id: number;\n}\n"));
        assert_eq!(ts.matches("export ").count(), 1);
    }

    #[test]
    fn test_child_with_root_shape_keeps_own_name() {
        let ts = InterfaceConverter::convert("gallery", &json!({ "title": "a" }));
        assert_eq!(ts, "export interface Gallery {\n  title: string;\n}\n");

        let ts = InterfaceConverter::convert(
            "gallery",
            &json!({ "cover": { "title": "a" }, "title": "b" }),
        );
        assert!(ts.starts_with("export interface Gallery {\n  cover: Cover;\n  title: string;\n}\n"));
        assert!(ts.contains("\ninterface Cover {\n  title: string;\n}\n"));
    }

    #[test]
    fn test_non_identifier_keys_are_quoted() {
        let ts = InterfaceConverter::convert(
            "paths",
            &json!({ "/galleries/{gallery_id}": { "get": {} }, "$ref": "x" }),
        );
        assert!(ts.contains("  \"/galleries/{gallery_id}\": GalleriesGalleryId;\n"));
        assert!(ts.contains("  $ref: string;\n"));
    }
}
