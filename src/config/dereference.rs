//! Resolution of templated values inside a configuration tree.
//!
//! A single pass visits every string leaf holding `{{` or `{%`, renders it
//! against a context built from the variable source, the enclosing mapping
//! and the whole tree, and stores the typed result back in place. Leaves that
//! cannot be resolved yet keep their template text for a later pass.

use super::source::VariableSource;
use crate::error::{ConfigError, ConfigResult};
use crate::template::{Rendered, Renderer, str_to_type};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Default number of passes before [`Dereferencer::dereference_all`] gives up.
pub const DEFAULT_MAX_ITERATIONS: usize = 25;

/// One step from a parent node to a child.
#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

enum Step {
    Descend,
    Resolve(String),
    Skip,
}

/// A piece of a templated string.
#[derive(Debug, PartialEq)]
enum Unit<'a> {
    Literal(&'a str),
    Template(&'a str),
}

/// Returns true if the string carries template markers.
pub fn is_template(s: &str) -> bool {
    s.contains("{{") || s.contains("{%")
}

/// Split a templated string into renderable units.
///
/// With a `{%` marker anywhere the whole string is a single unit, so control
/// blocks keep their bodies. Otherwise each `{{ ... }}` is its own unit and
/// the text between them passes through untouched.
fn split_units(s: &str) -> Vec<Unit<'_>> {
    if s.contains("{%") {
        return vec![Unit::Template(s)];
    }
    let Ok(re) = regex_lite::Regex::new(r"\{\{[^}]*\}\}") else {
        return vec![Unit::Template(s)];
    };
    let mut units = Vec::new();
    let mut last = 0;
    for m in re.find_iter(s) {
        if m.start() > last {
            units.push(Unit::Literal(&s[last..m.start()]));
        }
        units.push(Unit::Template(m.as_str()));
        last = m.end();
    }
    if last < s.len() {
        units.push(Unit::Literal(&s[last..]));
    }
    units
}

/// Walks a config tree resolving templates.
pub struct Dereferencer<'s> {
    renderer: Renderer,
    source: &'s dyn VariableSource,
    max_iterations: usize,
}

impl<'s> Dereferencer<'s> {
    pub fn new(source: &'s dyn VariableSource) -> Self {
        Self {
            renderer: Renderer::new(),
            source,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Run one resolution pass over `tree`.
    pub fn dereference(&self, tree: &mut Map<String, Value>) -> ConfigResult<()> {
        let env = self.source.variables();
        let mut root = Value::Object(std::mem::take(tree));
        let result = self.walk(&mut root, &mut Vec::new(), &env);
        if let Value::Object(map) = root {
            *tree = map;
        }
        result
    }

    /// Repeat [`dereference`](Self::dereference) until the tree stops changing.
    ///
    /// Returns the number of passes taken. Fails with
    /// [`ConfigError::DidNotConverge`] if the tree is still changing after the
    /// configured number of passes.
    pub fn dereference_all(&self, tree: &mut Map<String, Value>) -> ConfigResult<usize> {
        for pass in 1..=self.max_iterations {
            let previous = tree.clone();
            self.dereference(tree)?;
            if *tree == previous {
                debug!(passes = pass, "configuration templates settled");
                return Ok(pass);
            }
        }
        Err(ConfigError::DidNotConverge {
            iterations: self.max_iterations,
        })
    }

    fn walk(&self, root: &mut Value, path: &mut Vec<Segment>, env: &Map<String, Value>) -> ConfigResult<()> {
        let children: Vec<Segment> = match node(root, path) {
            Some(Value::Object(map)) => map.keys().cloned().map(Segment::Key).collect(),
            Some(Value::Array(items)) => (0..items.len()).map(Segment::Index).collect(),
            _ => return Ok(()),
        };

        for child in children {
            path.push(child);
            let step = match node(root, path) {
                Some(Value::Object(_)) | Some(Value::Array(_)) => Step::Descend,
                Some(Value::String(s)) if is_template(s) => Step::Resolve(s.clone()),
                _ => Step::Skip,
            };
            match step {
                Step::Descend => self.walk(root, path, env)?,
                Step::Resolve(template) => {
                    let context = build_context(root, path, env);
                    let resolved = self.resolve(&key_name(path), &template, &context)?;
                    if let Some(slot) = node_mut(root, path) {
                        *slot = resolved;
                    }
                }
                Step::Skip => {}
            }
            path.pop();
        }
        Ok(())
    }

    fn resolve(&self, key: &str, text: &str, context: &Map<String, Value>) -> ConfigResult<Value> {
        let mut out = String::with_capacity(text.len());
        for unit in split_units(text) {
            match unit {
                Unit::Literal(s) => out.push_str(s),
                Unit::Template(t) => match self.renderer.render(key, t, context)? {
                    Rendered::Text(rendered) => out.push_str(&rendered),
                    Rendered::Soft(_) => out.push_str(t),
                },
            }
        }
        trace!(key, from = text, to = %out, "resolved");
        Ok(str_to_type(&out))
    }
}

/// Convenience wrapper for a single pass.
pub fn dereference(tree: &mut Map<String, Value>, source: &dyn VariableSource) -> ConfigResult<()> {
    Dereferencer::new(source).dereference(tree)
}

/// Convenience wrapper for resolving to a fixed point with the default cap.
pub fn dereference_all(tree: &mut Map<String, Value>, source: &dyn VariableSource) -> ConfigResult<usize> {
    Dereferencer::new(source).dereference_all(tree)
}

/// Environment, then the mapping enclosing the leaf, then the whole tree.
fn build_context(root: &Value, path: &[Segment], env: &Map<String, Value>) -> Map<String, Value> {
    let mut context = env.clone();
    let parent = &path[..path.len().saturating_sub(1)];
    if let Some(enclosing) = enclosing_mapping(root, parent) {
        if !std::ptr::eq(enclosing, root) {
            if let Value::Object(map) = enclosing {
                context.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
    }
    if let Value::Object(map) = root {
        context.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    context
}

/// Nearest mapping at or above `path`.
fn enclosing_mapping<'v>(root: &'v Value, path: &[Segment]) -> Option<&'v Value> {
    for depth in (0..=path.len()).rev() {
        if let Some(v @ Value::Object(_)) = node(root, &path[..depth]) {
            return Some(v);
        }
    }
    None
}

fn node<'v>(root: &'v Value, path: &[Segment]) -> Option<&'v Value> {
    path.iter().try_fold(root, |v, seg| match (v, seg) {
        (Value::Object(map), Segment::Key(k)) => map.get(k),
        (Value::Array(items), Segment::Index(i)) => items.get(*i),
        _ => None,
    })
}

fn node_mut<'v>(root: &'v mut Value, path: &[Segment]) -> Option<&'v mut Value> {
    path.iter().try_fold(root, |v, seg| match (v, seg) {
        (Value::Object(map), Segment::Key(k)) => map.get_mut(k),
        (Value::Array(items), Segment::Index(i)) => items.get_mut(*i),
        _ => None,
    })
}

fn key_name(path: &[Segment]) -> String {
    let mut name = String::new();
    for seg in path {
        match seg {
            Segment::Key(k) => {
                if !name.is_empty() {
                    name.push('.');
                }
                name.push_str(k);
            }
            Segment::Index(i) => name.push_str(&format!("[{}]", i)),
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::StaticVars;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_split_units_keeps_whitespace() {
        let units = split_units("a {{ x }} b{{y}}");
        assert_eq!(
            units,
            vec![
                Unit::Literal("a "),
                Unit::Template("{{ x }}"),
                Unit::Literal(" b"),
                Unit::Template("{{y}}"),
            ]
        );
    }

    #[test]
    fn test_split_units_control_block_is_one_unit() {
        let s = "{% if x %}{{ y }}{% endif %}";
        assert_eq!(split_units(s), vec![Unit::Template(s)]);
    }

    #[test]
    fn test_arithmetic_resolves_to_integer() {
        let mut tree = obj(json!({"x": 3, "y": 4, "z": "{{ x + y }}"}));
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["z"], json!(7));
    }

    #[test]
    fn test_undefined_left_in_place_then_resolved() {
        let mut tree = obj(json!({"a": "{{ z }}"}));
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["a"], json!("{{ z }}"));

        tree.insert("z".to_string(), json!("found"));
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["a"], json!("found"));
    }

    #[test]
    fn test_partial_resolution_in_composite_string() {
        let mut tree = obj(json!({"dir": "/data", "path": "{{ dir }}/{{ cycle }}/file"}));
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["path"], json!("/data/{{ cycle }}/file"));
    }

    #[test]
    fn test_local_and_cross_section_references() {
        let mut tree = obj(json!({
            "user": {"HOMEdir": "/srw", "USHdir": "{{ HOMEdir }}/ush"},
            "workflow": {"EXPTDIR": "{{ user.HOMEdir }}/expt"}
        }));
        dereference_all(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["user"]["USHdir"], json!("/srw/ush"));
        assert_eq!(tree["workflow"]["EXPTDIR"], json!("/srw/expt"));
    }

    #[test]
    fn test_top_level_beats_local() {
        let mut tree = obj(json!({
            "name": "top",
            "section": {"name": "local", "who": "{{ name }}"}
        }));
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["section"]["who"], json!("top"));
    }

    #[test]
    fn test_environment_variables_visible() {
        let vars = StaticVars::new().with("HOME", "/home/user");
        let mut tree = obj(json!({"work": "{{ HOME }}/work"}));
        dereference(&mut tree, &vars).unwrap();
        assert_eq!(tree["work"], json!("/home/user/work"));
    }

    #[test]
    fn test_sequences_are_walked() {
        let mut tree = obj(json!({"n": 2, "list": ["{{ n }}", "plain", {"inner": "{{ n * 2 }}"}]}));
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["list"], json!([2, "plain", {"inner": 4}]));
    }

    #[test]
    fn test_chain_needs_multiple_passes() {
        let mut tree = obj(json!({"a": "{{ b }}", "b": "{{ c }}", "c": "yes"}));
        let passes = dereference_all(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["a"], json!(true));
        assert!(passes >= 2);
    }

    #[test]
    fn test_fixed_point_is_idempotent() {
        let mut tree = obj(json!({"a": 1, "b": "{{ a + 1 }}"}));
        dereference_all(&mut tree, &StaticVars::new()).unwrap();
        let settled = tree.clone();
        dereference_all(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree, settled);
    }

    #[test]
    fn test_reference_to_nan_string_resolves() {
        let mut tree = obj(json!({"mode": "nan", "label": "{{ mode }}"}));
        dereference_all(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["label"], json!("nan"));
    }

    #[test]
    fn test_non_template_strings_unchanged() {
        let original = obj(json!({"a": "'quoted'", "b": "yes", "c": {"d": "1"}}));
        let mut tree = original.clone();
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree, original);
    }

    #[test]
    fn test_divergent_template_hits_cap() {
        let mut tree = obj(json!({"a": "{{ a }}x"}));
        let err = Dereferencer::new(&StaticVars::new())
            .with_max_iterations(5)
            .dereference_all(&mut tree)
            .unwrap_err();
        assert!(matches!(err, ConfigError::DidNotConverge { iterations: 5 }));
    }

    #[test]
    fn test_control_block_rendered_whole() {
        let mut tree = obj(json!({"flag": true, "msg": "{% if flag %}on{% else %}off{% endif %}"}));
        dereference(&mut tree, &StaticVars::new()).unwrap();
        assert_eq!(tree["msg"], json!("on"));
    }
}
