//! String pooling
//!
//! Selected string literals move into one array and each use site becomes a
//! call to an accessor function. The array can be shuffled (an index map in
//! the accessor restores logical order), stored rotated (a small init
//! function rotates it back at load time), and base64 encoded (the accessor
//! decodes).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use veil_core::TransformProfile;

use super::{PreludeSlot, Stage, StageContext, push_token, rewritable_strings};
use crate::error::Result;
use crate::lexer::{tokenize, unescape_string};

/// Runtime base64 decoder; works in browsers (`atob`) and Node (`Buffer`)
const BASE64_DECODER: &str = concat!(
    "function {name}(s){",
    "var b=typeof atob===\"function\"?atob(s):Buffer.from(s,\"base64\").toString(\"binary\");",
    "var o=\"\";",
    "for(var i=0;i<b.length;i++){o+=\"%\"+(\"00\"+b.charCodeAt(i).toString(16)).slice(-2);}",
    "return decodeURIComponent(o);",
    "}"
);

/// `stringPooling`
pub struct StringPool;

impl Stage for StringPool {
    fn name(&self) -> &'static str {
        "string-pooling"
    }

    fn enabled(&self, profile: &TransformProfile) -> bool {
        profile.string_pooling
    }

    fn apply(&self, source: &str, ctx: &mut StageContext<'_>) -> Result<String> {
        let segments = tokenize(source)?;
        let rewritable = rewritable_strings(&segments);
        let threshold = ctx.profile.string_pool_threshold;

        // Pick literals and assign each distinct value a logical index
        let mut entries: Vec<String> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        let mut picks: Vec<Option<usize>> = Vec::with_capacity(segments.len());
        for (seg, ok) in segments.iter().zip(rewritable) {
            let pick = if ok && ctx.names.rng().gen_range(0.0..1.0) < threshold {
                unescape_string(seg.text).map(|value| {
                    *index_of.entry(value.clone()).or_insert_with(|| {
                        entries.push(value);
                        entries.len() - 1
                    })
                })
            } else {
                None
            };
            picks.push(pick);
        }
        if entries.is_empty() {
            return Ok(source.to_string());
        }

        let layout = PoolLayout::plan(entries, ctx);
        let mut out = String::with_capacity(source.len());
        for (seg, pick) in segments.iter().zip(picks) {
            match pick {
                Some(idx) => push_token(&mut out, &format!("{}({idx})", layout.accessor)),
                None => out.push_str(seg.text),
            }
        }
        ctx.push_prelude(PreludeSlot::Pool, layout.render());
        Ok(out)
    }
}

/// Where every pooled value ends up, plus the names of the runtime pieces
#[derive(Debug)]
struct PoolLayout {
    array: String,
    accessor: String,
    decoder: Option<String>,
    /// Values as emitted, already encoded
    emitted: Vec<String>,
    /// Logical index to position in the restored array, when shuffled
    map: Option<(String, Vec<usize>)>,
    /// Left-rotations the init function performs
    rotation: usize,
}

impl PoolLayout {
    fn plan(entries: Vec<String>, ctx: &mut StageContext<'_>) -> Self {
        let profile = ctx.profile;
        let n = entries.len();
        let array = ctx.names.fresh("pool");
        let accessor = ctx.names.fresh("get");
        let decoder = profile.encodes_base64().then(|| ctx.names.fresh("decode"));

        let encode = |value: &str| match decoder {
            Some(_) => STANDARD.encode(value.as_bytes()),
            None => value.to_string(),
        };

        // stored[pos] is what the array holds once the init rotation has run
        let (stored, map) = if profile.string_pool_shuffle && n > 1 {
            let mut perm: Vec<usize> = (0..n).collect();
            perm.shuffle(ctx.names.rng());
            let mut stored = vec![String::new(); n];
            for (logical, &pos) in perm.iter().enumerate() {
                stored[pos] = encode(&entries[logical]);
            }
            (stored, Some((ctx.names.fresh("map"), perm)))
        } else {
            (entries.iter().map(|e| encode(e)).collect(), None)
        };

        let rotation = if profile.string_pool_rotate && n > 1 {
            ctx.names.rng().gen_range(1..n)
        } else {
            0
        };
        let mut emitted = stored;
        emitted.rotate_right(rotation);

        Self {
            array,
            accessor,
            decoder,
            emitted,
            map,
            rotation,
        }
    }

    fn render(&self) -> String {
        let literals: Vec<String> = self
            .emitted
            .iter()
            .map(|v| serde_json::Value::String(v.clone()).to_string())
            .collect();

        let mut code = format!("var {}=[{}];", self.array, literals.join(","));
        if self.rotation > 0 {
            code.push_str(&format!(
                "(function(a,n){{while(n--){{a.push(a.shift());}}}})({},{});",
                self.array, self.rotation
            ));
        }
        if let Some((name, perm)) = &self.map {
            let positions: Vec<String> = perm.iter().map(usize::to_string).collect();
            code.push_str(&format!("var {name}=[{}];", positions.join(",")));
        }
        if let Some(decoder) = &self.decoder {
            code.push_str(&BASE64_DECODER.replace("{name}", decoder));
        }

        let lookup = match &self.map {
            Some((name, _)) => format!("{}[{name}[i]]", self.array),
            None => format!("{}[i]", self.array),
        };
        let value = match &self.decoder {
            Some(decoder) => format!("{decoder}({lookup})"),
            None => lookup,
        };
        code.push_str(&format!(
            "function {}(i){{return {value};}}",
            self.accessor
        ));
        code
    }
}
