//! Renders a parsed template AST using the expression engine and a
//! loader abstraction for `extends`/`include`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use super::ast::Node;
use super::loader::Loader;
use super::parser::parse;
use crate::error::{RecipeError, Result};
use crate::expr::eval::{eval, Environment};
use crate::expr::value::{AttrObject, Value};

/// A lexically nested scope: local `set` bindings shadow the parent
/// environment, mirroring the context chain's "current -> parent ..."
/// lookup order (spec.md §4.2).
pub struct Scope<'a> {
    vars: RefCell<IndexMap<String, Value>>,
    parent: &'a dyn Environment,
}

impl<'a> Scope<'a> {
    pub fn new(parent: &'a dyn Environment) -> Self {
        Scope {
            vars: RefCell::new(IndexMap::new()),
            parent,
        }
    }

    fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }
}

impl Environment for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.vars.borrow().get(name) {
            return Some(v.clone());
        }
        self.parent.lookup(name)
    }
}

#[derive(Debug)]
struct LoopInfo {
    last: bool,
}

impl AttrObject for LoopInfo {
    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "last" => Some(Value::Bool(self.last)),
            _ => None,
        }
    }
}

/// Renders `src`, following a single `extends` hop if the template's
/// first statement is `{% extends "parent" %}`.
pub fn render_template(src: &str, env: &dyn Environment, loader: &dyn Loader) -> Result<String> {
    let nodes = parse(src)?;
    render_parsed(&nodes, env, loader)
}

pub fn render_parsed(nodes: &[Node], env: &dyn Environment, loader: &dyn Loader) -> Result<String> {
    if let Some(Node::Extends(parent_name)) = nodes.first() {
        let mut overrides = HashMap::new();
        collect_blocks(&nodes[1..], &mut overrides);
        let parent_src = loader.load(parent_name).ok_or_else(|| {
            RecipeError::template_syntax(format!("template {parent_name:?} not found"))
        })?;
        let parent_nodes = parse(&parent_src)?;
        let mut out = String::new();
        render_nodes(&parent_nodes, env, loader, &overrides, &mut out)?;
        return Ok(out);
    }
    let mut out = String::new();
    render_nodes(nodes, env, loader, &HashMap::new(), &mut out)?;
    Ok(out)
}

/// Entry point for rendering a standalone node sequence (e.g. a
/// directive's template string already parsed once and reused).
pub fn render_nodes_top(nodes: &[Node], env: &dyn Environment, loader: &dyn Loader) -> Result<String> {
    let mut out = String::new();
    render_nodes(nodes, env, loader, &HashMap::new(), &mut out)?;
    Ok(out)
}

fn collect_blocks(nodes: &[Node], out: &mut HashMap<String, Vec<Node>>) {
    for node in nodes {
        if let Node::Block { name, body } = node {
            out.insert(name.clone(), body.clone());
            collect_blocks(body, out);
        }
    }
}

/// Renders a node sequence inside a fresh scope, so `set` statements are
/// visible to later siblings but do not leak into the caller's scope.
fn render_nodes(
    nodes: &[Node],
    env: &dyn Environment,
    loader: &dyn Loader,
    overrides: &HashMap<String, Vec<Node>>,
    out: &mut String,
) -> Result<()> {
    let scope = Scope::new(env);
    for node in nodes {
        match node {
            Node::Set { name, expr } => {
                let value = eval(expr, &scope)?;
                scope.set(name, value);
            }
            other => render_node(other, &scope, loader, overrides, out)?,
        }
    }
    Ok(())
}

fn render_node(
    node: &Node,
    env: &dyn Environment,
    loader: &dyn Loader,
    overrides: &HashMap<String, Vec<Node>>,
    out: &mut String,
) -> Result<()> {
    match node {
        Node::Text(t) => out.push_str(t),
        Node::Raw(t) => out.push_str(t),
        Node::Output(expr) => {
            let value = eval(expr, env)?;
            out.push_str(&value.render());
        }
        Node::Set { .. } => unreachable!("Set nodes are consumed by render_nodes before reaching render_node"),
        Node::If { branches, else_branch } => {
            for (cond, body) in branches {
                if eval(cond, env)?.is_truthy() {
                    return render_nodes(body, env, loader, overrides, out);
                }
            }
            if let Some(body) = else_branch {
                return render_nodes(body, env, loader, overrides, out);
            }
        }
        Node::For { targets, iter, body, else_branch } => {
            let iterable = eval(iter, env)?;
            let items = iterable.iter_values()?;
            if items.is_empty() {
                if let Some(body) = else_branch {
                    return render_nodes(body, env, loader, overrides, out);
                }
                return Ok(());
            }
            let count = items.len();
            for (i, item) in items.into_iter().enumerate() {
                let scope = Scope::new(env);
                if let Some(first) = targets.first() {
                    scope.set(first, item);
                }
                scope.set(
                    "loop",
                    Value::Object(std::rc::Rc::new(LoopInfo { last: i + 1 == count })),
                );
                render_nodes(body, &scope, loader, overrides, out)?;
            }
        }
        Node::Block { name, body } => {
            let effective = overrides.get(name).map(Vec::as_slice).unwrap_or(body);
            render_nodes(effective, env, loader, overrides, out)?;
        }
        Node::Extends(_) => {
            // Only meaningful as the first node of a file; ignored when
            // encountered nested (the reference engine never nests it).
        }
        Node::Include(name) => {
            let src = loader
                .load(name)
                .ok_or_else(|| RecipeError::template_syntax(format!("template {name:?} not found")))?;
            let rendered = render_template(&src, env, loader)?;
            out.push_str(&rendered);
        }
    }
    Ok(())
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({:?})", self.vars.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::loader::NullLoader;
    use std::collections::HashMap as Map;

    struct MapEnv(Map<String, Value>);
    impl Environment for MapEnv {
        fn lookup(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }
    }

    fn scope_with<'a>(env: &'a dyn Environment, name: &str, value: Value) -> Scope<'a> {
        let scope = Scope::new(env);
        scope.set(name, value);
        scope
    }

    #[test]
    fn renders_jinja_variable() {
        let env = MapEnv(Map::new());
        let rendered =
            render_template("{{ v }}", &scope_with(&env, "v", Value::str("2.3.1-rc")), &NullLoader).unwrap();
        assert_eq!(rendered, "2.3.1-rc");
    }

    #[test]
    fn set_is_visible_to_later_siblings() {
        let env = MapEnv(Map::new());
        let rendered = render_template("{% set x = 1 %}{{ x }}", &env, &NullLoader).unwrap();
        assert_eq!(rendered, "1");
    }

    #[test]
    fn for_loop_binds_first_target_only_for_dict() {
        let mut m = IndexMap::new();
        m.insert("a".to_string(), Value::Int(1));
        m.insert("b".to_string(), Value::Int(2));
        let mut outer = Map::new();
        outer.insert("items".to_string(), Value::Dict(m));
        let env = MapEnv(outer);
        let rendered = render_template("{% for k, v in items %}{{ k }}{% endfor %}", &env, &NullLoader)
            .unwrap();
        assert_eq!(rendered, "ab");
    }

    #[test]
    fn if_elif_else() {
        let mut m = Map::new();
        m.insert("x".to_string(), Value::Int(2));
        let env = MapEnv(m);
        let rendered = render_template(
            "{% if x == 1 %}one{% elif x == 2 %}two{% else %}other{% endif %}",
            &env,
            &NullLoader,
        )
        .unwrap();
        assert_eq!(rendered, "two");
    }

    #[test]
    fn loop_last_flag() {
        let mut m = Map::new();
        m.insert(
            "items".to_string(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        );
        let env = MapEnv(m);
        let rendered = render_template(
            "{% for x in items %}{{ x }}{% if loop.last %}!{% else %},{% endif %}{% endfor %}",
            &env,
            &NullLoader,
        )
        .unwrap();
        assert_eq!(rendered, "1,2,3!");
    }

    #[test]
    fn extends_overrides_block() {
        let mut loader = crate::template::loader::MapLoader::new();
        loader.insert("base.txt", "before {% block body %}base{% endblock %} after");
        let env = MapEnv(Map::new());
        let rendered = render_template(
            r#"{% extends "base.txt" %}{% block body %}child{% endblock %}"#,
            &env,
            &loader,
        )
        .unwrap();
        assert_eq!(rendered, "before child after");
    }
}
