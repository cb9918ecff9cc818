//! Dead code injection
//!
//! Adds decoy function declarations that are never called. Their bodies are
//! plain arithmetic over random constants, so they hold no string literals
//! and reference nothing outside themselves.

use veil_core::TransformProfile;

use super::{PreludeSlot, Stage, StageContext};
use crate::error::Result;
use crate::names::SeededRng;
use rand::Rng;

/// Upper bound on decoys for a threshold of 1
const MAX_DECOYS: f64 = 8.0;

/// `deadCodeInjection`
pub struct DeadCode;

impl Stage for DeadCode {
    fn name(&self) -> &'static str {
        "dead-code-injection"
    }

    fn enabled(&self, profile: &TransformProfile) -> bool {
        profile.dead_code_injection
    }

    fn apply(&self, source: &str, ctx: &mut StageContext<'_>) -> Result<String> {
        let count = decoy_count(ctx.profile.dead_code_injection_threshold);
        if count == 0 {
            return Ok(source.to_string());
        }

        let mut decoys = String::new();
        for _ in 0..count {
            let name = ctx.names.fresh("decoy");
            decoys.push_str(&decoy(&name, ctx.names.rng()));
        }
        ctx.push_prelude(PreludeSlot::Decoys, decoys);
        Ok(source.to_string())
    }
}

fn decoy_count(threshold: f64) -> usize {
    (threshold.clamp(0.0, 1.0) * MAX_DECOYS).ceil() as usize
}

fn decoy(name: &str, rng: &mut SeededRng) -> String {
    let k1: u32 = rng.gen_range(0x10..0x100f);
    let k2: u32 = rng.gen_range(1..0x20);
    let k3: u32 = rng.gen_range(1..0x10000);
    match rng.gen_range(0..3) {
        0 => format!(
            "function {name}(a,b){{var c=a^0x{k1:x};if(c>b){{return c-0x{k2:x};}}return(b+c)%0x{k3:x}||0;}}"
        ),
        1 => format!(
            "function {name}(a){{var s=0;for(var i=0;i<0x{k2:x};i++){{s=(s*0x{k1:x}+a+i)&0x{k3:x};}}return s;}}"
        ),
        _ => format!(
            "function {name}(a,b){{while(a>0x{k2:x}){{a=a>>1^b;b=(b+0x{k1:x})&0x{k3:x};}}return[a,b];}}"
        ),
    }
}
