use crate::harden::HardeningSchedule;

/// JavaScript that performs the hardening algorithm inside a webview.
///
/// Inject it as an initialization script so it runs before any extension
/// code. It scrubs `names` immediately, after `schedule.short` and
/// `schedule.long`, and on the window `load` event, and exposes a read-only
/// `sandboxStatus.tauriGlobalsPresent`.
pub fn hardening_script(names: &[String], schedule: HardeningSchedule) -> String {
    // A JSON string array is a valid JS array literal.
    let names_literal = serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(function () {{
  "use strict";
  var NAMES = {names_literal};
  var state = {{ tauriGlobalsPresent: false }};
  function scrub() {{
    for (var i = 0; i < NAMES.length; i++) {{
      var name = NAMES[i];
      var desc;
      try {{ desc = Object.getOwnPropertyDescriptor(globalThis, name); }} catch (e) {{ continue; }}
      if (!desc) continue;
      if (desc.value === undefined && desc.writable === false && desc.configurable === false) continue;
      state.tauriGlobalsPresent = true;
      try {{
        Object.defineProperty(globalThis, name, {{
          value: undefined,
          writable: false,
          configurable: false,
          enumerable: !!desc.enumerable
        }});
      }} catch (e) {{}}
    }}
  }}
  scrub();
  setTimeout(scrub, {short});
  setTimeout(scrub, {long});
  if (typeof globalThis.addEventListener === "function") {{
    globalThis.addEventListener("load", scrub);
  }}
  Object.defineProperty(globalThis, "sandboxStatus", {{
    value: Object.freeze({{
      get tauriGlobalsPresent() {{ return state.tauriGlobalsPresent; }}
    }}),
    writable: false,
    configurable: false,
    enumerable: false
  }});
}})();
"#,
        short = schedule.short.as_millis(),
        long = schedule.long.as_millis(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harden::privileged_globals;
    use std::time::Duration;

    #[test]
    fn script_embeds_names_and_schedule() {
        let schedule = HardeningSchedule {
            short: Duration::from_millis(25),
            long: Duration::from_millis(750),
        };
        let js = hardening_script(&privileged_globals(&["__HOST\"X__".into()]), schedule);
        assert!(js.contains(r#""__TAURI_INTERNALS__""#));
        assert!(js.contains(r#""__HOST\"X__""#));
        assert!(js.contains("setTimeout(scrub, 25);"));
        assert!(js.contains("setTimeout(scrub, 750);"));
        assert!(js.contains(r#"addEventListener("load", scrub)"#));
        assert!(js.contains("tauriGlobalsPresent"));
        assert!(js.trim_end().ends_with("})();"));
    }
}
