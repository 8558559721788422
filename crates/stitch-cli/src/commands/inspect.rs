//! `stitch inspect`: dump the declarations of a module

use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;

use stitch_bytecode::{flags, Attribute, AttributeArg, MethodDef, Module, ParamDirection, TypeDef};

use super::read_module;
use crate::output::StyledOutput;

pub fn execute(path: &Path, out: &mut StyledOutput) -> anyhow::Result<ExitCode> {
    let module = read_module(path)?;
    out.bold(&format!("module {}", module.metadata.name));
    out.info(&module_flags(&module));
    out.newline();
    for ty in &module.imports {
        out.plain(&format!("  import {} {}\n", ty.kind.keyword(), ty.name));
    }
    for ty in &module.types {
        out.bold(&type_header(ty));
        out.newline();
        out.plain(&type_members(ty));
    }
    Ok(ExitCode::SUCCESS)
}

fn module_flags(module: &Module) -> String {
    let mut tags = Vec::new();
    if module.flags & flags::WOVEN != 0 {
        tags.push("woven");
    }
    if module.flags & flags::HAS_DEBUG_MAP != 0 {
        tags.push("debug map");
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!(" ({})", tags.join(", "))
    }
}

/// `  class Game.Actor : Host.CoreObject [ExposedClass]`
pub fn type_header(ty: &TypeDef) -> String {
    let mut line = format!("  {} {}", ty.kind.keyword(), ty.name);
    let mut bases: Vec<&str> = ty.base.iter().map(String::as_str).collect();
    bases.extend(ty.interfaces.iter().map(String::as_str));
    if !bases.is_empty() {
        let _ = write!(line, " : {}", bases.join(", "));
    }
    if let Some(underlying) = &ty.underlying {
        let _ = write!(line, " as {}", underlying);
    }
    line.push_str(&attributes(&ty.attributes));
    line
}

/// One indented line per field, property and method
pub fn type_members(ty: &TypeDef) -> String {
    let mut text = String::new();
    for field in &ty.fields {
        let _ = write!(
            text,
            "    field {}{}{}: {}",
            if field.is_static { "static " } else { "" },
            if field.is_readonly { "readonly " } else { "" },
            field.name,
            field.ty
        );
        if let Some(value) = field.constant {
            let _ = write!(text, " = {}", value);
        }
        let _ = writeln!(text, "{}", attributes(&field.attributes));
    }
    for property in &ty.properties {
        let _ = writeln!(
            text,
            "    property {}: {}{}",
            property.name,
            property.ty,
            attributes(&property.attributes)
        );
    }
    for method in &ty.methods {
        let _ = writeln!(text, "    {}", method_line(method));
    }
    text
}

fn method_line(method: &MethodDef) -> String {
    let mut modifiers = String::new();
    for (set, word) in [
        (method.is_static, "static "),
        (method.is_abstract, "abstract "),
        (method.is_virtual && !method.is_abstract, "virtual "),
    ] {
        if set {
            modifiers.push_str(word);
        }
    }
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| match p.direction {
            ParamDirection::In => format!("{}: {}", p.name, p.ty),
            ParamDirection::Out => format!("out {}: {}", p.name, p.ty),
            ParamDirection::Ref => format!("ref {}: {}", p.name, p.ty),
        })
        .collect();
    let size = method.body.as_ref().map_or_else(
        || " (no body)".to_string(),
        |body| format!(" ({} instrs)", body.instrs.len()),
    );
    format!(
        "method {}{}({}) -> {}{}{}",
        modifiers,
        method.name,
        params.join(", "),
        method.ret,
        attributes(&method.attributes),
        size
    )
}

fn attributes(attrs: &[Attribute]) -> String {
    if attrs.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = attrs
        .iter()
        .map(|a| {
            if a.args.is_empty() {
                return a.name.clone();
            }
            let args: Vec<String> = a
                .args
                .iter()
                .map(|arg| match arg {
                    AttributeArg::Int(v) => v.to_string(),
                    AttributeArg::Str(s) => format!("{:?}", s),
                    AttributeArg::Bool(b) => b.to_string(),
                })
                .collect();
            format!("{}({})", a.name, args.join(", "))
        })
        .collect();
    format!(" [{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stitch_bytecode::{FieldDef, MethodBody, ParamDef, TypeKind, TypeSig};

    fn actor() -> TypeDef {
        let mut ty = TypeDef::new("Game.Actor", TypeKind::Class);
        ty.base = Some("Host.CoreObject".into());
        ty.attributes.push(Attribute::new("ExposedClass"));
        let mut offset = FieldDef::new("Health_Offset", TypeSig::I32);
        offset.is_static = true;
        ty.fields.push(offset);
        ty.methods.push(
            MethodDef::new("TryGetLevel", vec![ParamDef::out("level", TypeSig::I32)], TypeSig::Bool)
                .with_body(MethodBody::new(vec![])),
        );
        let mut event = MethodDef::new("OnSpawned", vec![], TypeSig::Void);
        event.attributes.push(Attribute::new("ExposedFunction").with_str("Event"));
        ty.methods.push(event);
        ty
    }

    #[test]
    fn test_header_lists_base_and_markers() {
        assert_eq!(
            type_header(&actor()),
            "  class Game.Actor : Host.CoreObject [ExposedClass]"
        );
    }

    #[test]
    fn test_members_render_one_per_line() {
        let text = type_members(&actor());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("    field static Health_Offset: "));
        assert!(lines[1].contains("TryGetLevel(out level: "));
        assert!(lines[1].ends_with("(0 instrs)"));
        assert!(lines[2].contains("[ExposedFunction(\"Event\")] (no body)"));
    }
}
