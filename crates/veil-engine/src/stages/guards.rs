//! Runtime guards: console silencing, self-defending and debugger traps
//!
//! The guard snippets are minijinja templates rendered once per file. They
//! only reference globals that exist in both browsers and Node.

use minijinja::{Environment, Value, context};
use veil_core::TransformProfile;

use super::{PreludeSlot, Stage, StageContext};
use crate::error::Result;

const CONSOLE_TEMPLATE: &str = concat!(
    "(function(){",
    "var g=typeof globalThis!==\"undefined\"?globalThis:typeof window!==\"undefined\"?window:typeof global!==\"undefined\"?global:this;",
    "var c=g.console=g.console||{};",
    "var {{ noop }}=function(){};",
    "var m=[{% for method in methods %}\"{{ method }}\"{% if not loop.last %},{% endif %}{% endfor %}];",
    "for(var i=0;i<m.length;i++){c[m[i]]={{ noop }};}",
    "})();"
);

const SELF_DEFENDING_TEMPLATE: &str = concat!(
    "(function(){",
    "var {{ canary }}=function(){return!0};",
    "if(/\\s/.test(String({{ canary }}).slice(8))){",
    "throw new Error(\"{{ message }}\");",
    "}",
    "})();"
);

const DEBUG_TEMPLATE: &str = concat!(
    "(function(){",
    "function {{ trap }}(){",
    "var t=Date.now();debugger;",
    "if(Date.now()-t>{{ threshold_ms }}){for(;;){debugger;}}",
    "}",
    "{{ trap }}();",
    "{% if interval_ms > 0 %}",
    "var h=setInterval({{ trap }},{{ interval_ms }});",
    "if(h&&typeof h.unref===\"function\"){h.unref();}",
    "{% endif %}",
    "})();"
);

/// Console methods replaced with a no-op
const CONSOLE_METHODS: &[&str] = &[
    "log",
    "info",
    "warn",
    "error",
    "debug",
    "trace",
    "table",
    "exception",
];

/// How long a `debugger` statement may take before devtools count as open
const DEBUGGER_THRESHOLD_MS: u64 = 100;

/// `consoleOutputDisabled`, `selfDefending` and `debugProtection`
pub struct RuntimeGuards;

impl RuntimeGuards {
    fn environment() -> Result<Environment<'static>> {
        let mut env = Environment::new();
        env.add_template("console-guard", CONSOLE_TEMPLATE)?;
        env.add_template("self-defending", SELF_DEFENDING_TEMPLATE)?;
        env.add_template("debug-protection", DEBUG_TEMPLATE)?;
        Ok(env)
    }
}

impl Stage for RuntimeGuards {
    fn name(&self) -> &'static str {
        "runtime-guards"
    }

    fn enabled(&self, profile: &TransformProfile) -> bool {
        profile.console_output_disabled || profile.self_defending || profile.debug_protection
    }

    fn apply(&self, source: &str, ctx: &mut StageContext<'_>) -> Result<String> {
        let profile = ctx.profile;
        let env = Self::environment()?;
        let render = |name: &str, vars: Value| -> Result<String> {
            Ok(env.get_template(name)?.render(vars)?)
        };
        let mut guards = String::new();

        if profile.self_defending {
            guards.push_str(&render(
                "self-defending",
                context! {
                    canary => ctx.names.fresh("canary"),
                    message => "code integrity check failed",
                },
            )?);
        }
        if profile.debug_protection {
            guards.push_str(&render(
                "debug-protection",
                context! {
                    trap => ctx.names.fresh("trap"),
                    threshold_ms => DEBUGGER_THRESHOLD_MS,
                    interval_ms => profile.debug_protection_interval_ms,
                },
            )?);
        }
        if profile.console_output_disabled {
            guards.push_str(&render(
                "console-guard",
                context! {
                    noop => ctx.names.fresh("noop"),
                    methods => CONSOLE_METHODS,
                },
            )?);
        }

        ctx.push_prelude(PreludeSlot::Guards, guards);
        Ok(source.to_string())
    }
}
