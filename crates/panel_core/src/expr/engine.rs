use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use rhai::{
    packages::{BasicArrayPackage, BasicMapPackage, CorePackage, MoreStringPackage, Package},
    serde::{from_dynamic, to_dynamic},
    Array, Dynamic, Engine, EvalAltResult, ImmutableString, Module, Scope, AST, FLOAT, INT,
};
use serde_json::{Map, Value};

use super::{Effect, EvalContext, ExprError, Role};

static PACKAGES: LazyLock<Vec<Arc<Module>>> = LazyLock::new(|| {
    vec![
        CorePackage::new().as_shared_module(),
        MoreStringPackage::new().as_shared_module(),
        BasicArrayPackage::new().as_shared_module(),
        BasicMapPackage::new().as_shared_module(),
    ]
});

/// Engine with no I/O, no module loading and hard resource limits.
/// Variables missing from the scope read as `()`.
pub(super) fn sandboxed() -> Engine {
    let mut engine = Engine::new_raw();
    for package in PACKAGES.iter() {
        engine.register_global_module(package.clone());
    }

    engine.set_max_expr_depths(64, 64);
    engine.set_max_call_levels(16);
    engine.set_max_operations(10_000);
    engine.set_max_string_size(4_096);
    engine.set_max_array_size(256);
    engine.set_max_map_size(256);
    engine.disable_symbol("eval");
    engine.disable_symbol("import");

    engine.on_var(|name, _index, context| {
        if context.scope().contains(name) {
            Ok(None)
        } else {
            Ok(Some(Dynamic::UNIT))
        }
    });

    engine.register_fn("str", |value: Dynamic| value.to_string());
    engine.register_fn("num", num);

    engine
}

fn num(value: Dynamic) -> Dynamic {
    if value.is_int() || value.is_float() {
        return value;
    }
    if let Ok(flag) = value.as_bool() {
        return Dynamic::from_int(INT::from(flag));
    }
    let Ok(text) = value.into_immutable_string() else {
        return Dynamic::UNIT;
    };
    let text = text.trim();
    if let Ok(int) = text.parse::<INT>() {
        Dynamic::from_int(int)
    } else if let Ok(float) = text.parse::<FLOAT>() {
        Dynamic::from_float(float)
    } else {
        Dynamic::UNIT
    }
}

#[derive(Default)]
struct SinkState {
    effects: Vec<Effect>,
    denied: Option<String>,
}

/// Collects effects emitted by script calls during one evaluation.
#[derive(Clone)]
struct EffectSink {
    role: Role,
    state: Arc<Mutex<SinkState>>,
}

type CallResult = Result<(), Box<EvalAltResult>>;

impl EffectSink {
    fn new(role: Role) -> Self {
        Self {
            role,
            state: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, name: &str, effect: Effect) -> CallResult {
        let mut state = self.lock();
        if self.role == Role::Predicate {
            state.denied.get_or_insert_with(|| name.to_string());
            return Err(format!("'{name}' is not allowed in an enabled predicate").into());
        }
        state.effects.push(effect);
        Ok(())
    }

    fn finish(self) -> (Vec<Effect>, Option<String>) {
        let mut state = self.lock();
        (std::mem::take(&mut state.effects), state.denied.take())
    }

    fn register(&self, engine: &mut Engine) {
        let sink = self.clone();
        engine.register_fn("command", move |command: ImmutableString| {
            sink.emit("command", Effect::Command(command.to_string()))
        });

        let sink = self.clone();
        engine.register_fn("commands", move |list: Array| -> CallResult {
            let commands: Vec<String> = from_dynamic(&Dynamic::from_array(list))?;
            sink.emit("commands", Effect::Commands(commands))
        });
        let sink = self.clone();
        engine.register_fn(
            "commands",
            move |a: ImmutableString, b: ImmutableString| {
                sink.emit("commands", Effect::Commands(strings(&[a, b])))
            },
        );
        let sink = self.clone();
        engine.register_fn(
            "commands",
            move |a: ImmutableString, b: ImmutableString, c: ImmutableString| {
                sink.emit("commands", Effect::Commands(strings(&[a, b, c])))
            },
        );
        let sink = self.clone();
        engine.register_fn(
            "commands",
            move |a: ImmutableString,
                  b: ImmutableString,
                  c: ImmutableString,
                  d: ImmutableString| {
                sink.emit("commands", Effect::Commands(strings(&[a, b, c, d])))
            },
        );

        let sink = self.clone();
        engine.register_fn("script", move |name: ImmutableString| {
            sink.emit(
                "script",
                Effect::Script {
                    name: name.to_string(),
                    context: None,
                },
            )
        });
        let sink = self.clone();
        engine.register_fn(
            "script",
            move |name: ImmutableString, context: Dynamic| -> CallResult {
                let context: Map<String, Value> = from_dynamic(&context)?;
                sink.emit(
                    "script",
                    Effect::Script {
                        name: name.to_string(),
                        context: Some(context),
                    },
                )
            },
        );

        let sink = self.clone();
        engine.register_fn(
            "set",
            move |parameter: ImmutableString, value: Dynamic| -> CallResult {
                let value: Value = from_dynamic(&value)?;
                sink.emit(
                    "set",
                    Effect::SetInput {
                        parameter: parameter.to_string(),
                        value,
                    },
                )
            },
        );

        let sink = self.clone();
        engine.register_fn("send", move || sink.emit("send", Effect::Send));

        let sink = self.clone();
        engine.register_fn("log", move |value: Dynamic| -> CallResult {
            let value: Value = from_dynamic(&value)?;
            sink.emit("log", Effect::Log(value))
        });
    }
}

fn strings(items: &[ImmutableString]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// Runs a compiled program with the top-level keys of the JSON scope bound
/// as constants.
pub(super) fn run(ast: &AST, ctx: &mut EvalContext<'_>) -> Result<Value, ExprError> {
    let mut scope = Scope::new();
    if let Value::Object(entries) = ctx.scope {
        for (name, value) in entries {
            scope.push_constant(name.as_str(), to_dynamic(value)?);
        }
    }

    let sink = EffectSink::new(ctx.role);
    let mut engine = sandboxed();
    sink.register(&mut engine);

    let result = engine.eval_ast_with_scope::<Dynamic>(&mut scope, ast);
    let (effects, denied) = sink.finish();
    if let Some(name) = denied {
        return Err(ExprError::EffectNotAllowed { name });
    }

    let value: Value = from_dynamic(&result?)?;
    ctx.extend(effects);
    Ok(value)
}
