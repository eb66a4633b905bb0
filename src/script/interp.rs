//! Executes a parsed script against a `ScriptHost`: the fixed set of
//! built-ins (`install_packages`, `set_variable`, `run_command`,
//! `set_environment`, `print`) plus the read-only `context`/`local`
//! objects and the `raise(msg)` global.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::Stmt;
use super::parser::parse;
use crate::error::{RecipeError, Result};
use crate::expr::ast::Expr;
use crate::expr::eval::{eval, Environment};
use crate::expr::value::{AttrObject, Value};

/// The mutating surface a `BuildContext` exposes to scripts (§4.6).
/// `variables()` returns the *same* shared frame backing the context's
/// own variable lookups, so `context`/`local` (built from it once per
/// script run) observe writes made through `set_variable` during that
/// same run — open question #3 is resolved in favor of a live view,
/// not an independent snapshot.
pub trait ScriptHost {
    fn variables(&self) -> Rc<RefCell<IndexMap<String, Value>>>;
    fn install_packages(&mut self, pkgs: &[String]) -> Result<()>;
    fn run_command(&mut self, cmd: String);
    fn set_variable(&mut self, name: &str, value: Value);
    fn set_environment(&mut self, key: &str, value: String) {
        self.set_variable(&format!("_starlark_env_{key}"), Value::Str(value));
    }
    fn version(&self) -> String;
    fn parallel_jobs(&self) -> i64;
    fn package_manager(&self) -> String;
    fn arch(&self) -> String;
}

#[derive(Clone, Debug)]
struct ContextView {
    vars: Rc<RefCell<IndexMap<String, Value>>>,
    version: String,
    parallel_jobs: i64,
    package_manager: String,
    arch: String,
}

impl AttrObject for ContextView {
    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "version" => Some(Value::Str(self.version.clone())),
            "parallel_jobs" => Some(Value::Int(self.parallel_jobs)),
            "PackageManager" => Some(Value::Str(self.package_manager.clone())),
            "arch" => Some(Value::Str(self.arch.clone())),
            other => self.vars.borrow().get(other).cloned(),
        }
    }
}

struct ScriptEnv {
    locals: RefCell<IndexMap<String, Value>>,
    context_view: ContextView,
}

impl Environment for ScriptEnv {
    fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "context" | "local" => Some(Value::Object(Rc::new(self.context_view.clone()))),
            "raise" => Some(Value::Callable(Rc::new(|args: &[Value]| -> Result<Value> {
                let msg = args.first().map(Value::render).unwrap_or_default();
                Err(RecipeError::evaluation(msg))
            }))),
            other => self.locals.borrow().get(other).cloned(),
        }
    }
}

/// Parses and runs `src` against `host`. Script inputs are never
/// template-rendered first (§4.6).
pub fn run(src: &str, host: &mut dyn ScriptHost) -> Result<()> {
    let stmts = parse(src)?;
    let env = ScriptEnv {
        locals: RefCell::new(IndexMap::new()),
        context_view: ContextView {
            vars: host.variables(),
            version: host.version(),
            parallel_jobs: host.parallel_jobs(),
            package_manager: host.package_manager(),
            arch: host.arch(),
        },
    };
    execute_block(&stmts, host, &env)
}

fn execute_block(stmts: &[Stmt], host: &mut dyn ScriptHost, env: &ScriptEnv) -> Result<()> {
    for stmt in stmts {
        execute_stmt(stmt, host, env)?;
    }
    Ok(())
}

fn execute_stmt(stmt: &Stmt, host: &mut dyn ScriptHost, env: &ScriptEnv) -> Result<()> {
    match stmt {
        Stmt::Pass => Ok(()),
        Stmt::Assign(name, expr) => {
            let value = eval(expr, env)?;
            env.locals.borrow_mut().insert(name.clone(), value);
            Ok(())
        }
        Stmt::If { branches, else_branch } => {
            for (cond, body) in branches {
                if eval(cond, env)?.is_truthy() {
                    return execute_block(body, host, env);
                }
            }
            if let Some(body) = else_branch {
                execute_block(body, host, env)?;
            }
            Ok(())
        }
        Stmt::For { target, iter, body } => {
            let items = eval(iter, env)?.iter_values()?;
            for item in items {
                env.locals.borrow_mut().insert(target.clone(), item);
                execute_block(body, host, env)?;
            }
            Ok(())
        }
        Stmt::Expr(expr) => dispatch(expr, host, env),
    }
}

fn dispatch(expr: &Expr, host: &mut dyn ScriptHost, env: &ScriptEnv) -> Result<()> {
    if let Expr::Call { callee, args } = expr {
        if let Expr::Ident(name) = callee.as_ref() {
            match name.as_str() {
                "install_packages" => {
                    let pkgs = eval_str_args(args, env)?;
                    host.install_packages(&pkgs)?;
                    return Ok(());
                }
                "run_command" => {
                    let cmd = eval_str_arg(args, 0, env)?;
                    host.run_command(cmd);
                    return Ok(());
                }
                "set_variable" => {
                    let name = eval_str_arg(args, 0, env)?;
                    let value = eval(
                        args.get(1).ok_or_else(|| {
                            RecipeError::evaluation("set_variable requires (name, value)")
                        })?,
                        env,
                    )?;
                    host.set_variable(&name, crate::script::value::to_context_value(&value));
                    return Ok(());
                }
                "set_environment" => {
                    let key = eval_str_arg(args, 0, env)?;
                    let value = eval_str_arg(args, 1, env)?;
                    host.set_environment(&key, value);
                    return Ok(());
                }
                "print" => {
                    let mut parts = Vec::with_capacity(args.len());
                    for a in args {
                        parts.push(eval(a, env)?.render());
                    }
                    println!("{}", parts.join(" "));
                    return Ok(());
                }
                _ => {}
            }
        }
    }
    eval(expr, env).map(|_| ())
}

fn eval_str_arg(args: &[Expr], idx: usize, env: &ScriptEnv) -> Result<String> {
    let expr = args
        .get(idx)
        .ok_or_else(|| RecipeError::evaluation(format!("missing argument at position {idx}")))?;
    let value = eval(expr, env)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RecipeError::evaluation(format!("expected string argument, got {}", value.type_name())))
}

fn eval_str_args(args: &[Expr], env: &ScriptEnv) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(args.len());
    for a in args {
        let value = eval(a, env)?;
        out.push(value.as_str().map(str::to_string).ok_or_else(|| {
            RecipeError::evaluation(format!("expected string argument, got {}", value.type_name()))
        })?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeHost {
        vars: Rc<RefCell<IndexMap<String, Value>>>,
        installed: Vec<Vec<String>>,
        run_commands: Vec<String>,
    }

    impl ScriptHost for FakeHost {
        fn variables(&self) -> Rc<RefCell<IndexMap<String, Value>>> {
            self.vars.clone()
        }
        fn install_packages(&mut self, pkgs: &[String]) -> Result<()> {
            self.installed.push(pkgs.to_vec());
            Ok(())
        }
        fn run_command(&mut self, cmd: String) {
            self.run_commands.push(cmd);
        }
        fn set_variable(&mut self, name: &str, value: Value) {
            self.vars.borrow_mut().insert(name.to_string(), value);
        }
        fn version(&self) -> String {
            "1.0".to_string()
        }
        fn parallel_jobs(&self) -> i64 {
            4
        }
        fn package_manager(&self) -> String {
            "apt".to_string()
        }
        fn arch(&self) -> String {
            "x86_64".to_string()
        }
    }

    #[test]
    fn install_packages_reaches_host() {
        let mut host = FakeHost::default();
        run("install_packages('curl', 'git')", &mut host).unwrap();
        assert_eq!(host.installed, vec![vec!["curl".to_string(), "git".to_string()]]);
    }

    #[test]
    fn set_variable_is_visible_on_context_and_local_same_run() {
        let mut host = FakeHost::default();
        run(
            "set_variable('greeting', 'hi')\nif context.greeting == local.greeting:\n    run_command('ok')",
            &mut host,
        )
        .unwrap();
        assert_eq!(host.run_commands, vec!["ok".to_string()]);
    }

    #[test]
    fn set_environment_uses_reserved_prefix() {
        let mut host = FakeHost::default();
        run("set_environment('FOO', 'bar')", &mut host).unwrap();
        assert_eq!(
            host.vars.borrow().get("_starlark_env_FOO"),
            Some(&Value::Str("bar".to_string()))
        );
    }

    #[test]
    fn for_loop_installs_each_package() {
        let mut host = FakeHost::default();
        run(
            "for pkg in ['a', 'b']:\n    install_packages(pkg)",
            &mut host,
        )
        .unwrap();
        assert_eq!(host.installed, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }
}
