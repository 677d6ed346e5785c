// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Type string parser.

use crate::errors::TypeError;
use crate::table::TypeTable;
use crate::types::{Capability, Type};

/// Parse a type annotation string into a Type.
pub fn parse_type_string(s: &str, types: &TypeTable) -> Result<Type, TypeError> {
    let s = s.trim();

    if s.is_empty() {
        return Err(TypeError::InvalidTypeString(s.to_string()));
    }

    if let Some(ty) = types.builtins.get(s) {
        return Ok(ty.clone());
    }

    if s.starts_with('(') && s.ends_with(')') {
        let inner = &s[1..s.len() - 1];
        let parts = split_type_args(inner);
        if parts.len() == 1 {
            return parse_type_string(inner, types);
        }
        let elems: Result<Vec<_>, _> = parts.iter().map(|p| parse_type_string(p, types)).collect();
        return Ok(Type::Tuple(elems?));
    }

    if s.starts_with('[') && s.ends_with(']') {
        let inner = parse_type_string(&s[1..s.len() - 1], types)?;
        return Ok(Type::array(inner));
    }

    if let Some(lt_pos) = s.find('<') {
        if !s.ends_with('>') {
            return Err(TypeError::InvalidTypeString(s.to_string()));
        }
        let name = s[..lt_pos].trim();
        let args: Result<Vec<Type>, _> = split_type_args(&s[lt_pos + 1..s.len() - 1])
            .iter()
            .map(|a| parse_type_string(a, types))
            .collect();
        let mut args = args?;
        if args.len() != 1 {
            return Err(TypeError::CapabilityArity { cap: name.to_string(), expected: 1 });
        }
        let arg = args.remove(0);
        return match name {
            "span" => Ok(Type::span(arg)),
            "readonly_span" => Ok(Type::readonly_span(arg)),
            _ => match Capability::from_name(name) {
                Some(cap) if cap.is_generic() => Ok(Type::generic_capability(cap, arg)),
                Some(cap) => Err(TypeError::CapabilityArity { cap: cap.to_string(), expected: 0 }),
                None => Err(TypeError::Undefined(name.to_string())),
            },
        };
    }

    if let Some(cap) = Capability::from_name(s) {
        return match cap {
            Capability::AsyncEnumerable | Capability::AsyncEnumerator | Capability::Awaitable => {
                Err(TypeError::CapabilityArity { cap: cap.to_string(), expected: 1 })
            }
            _ => Ok(Type::capability(cap)),
        };
    }

    types
        .lookup(s)
        .map(Type::Named)
        .ok_or_else(|| TypeError::Undefined(s.to_string()))
}

/// Split comma-separated type arguments at nesting depth 0.
fn split_type_args(s: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut depth = 0;

    for c in s.chars() {
        match c {
            '<' | '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            '>' | ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                result.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        result.push(current.trim().to_string());
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TypeKind;

    #[test]
    fn parse_builtins_and_containers() {
        let table = TypeTable::new();
        assert_eq!(parse_type_string("int", &table).unwrap(), Type::I32);
        assert_eq!(parse_type_string(" [string] ", &table).unwrap(), Type::array(Type::String));
        assert_eq!(
            parse_type_string("(i32, (bool, char))", &table).unwrap(),
            Type::Tuple(vec![Type::I32, Type::Tuple(vec![Type::Bool, Type::Char])])
        );
        assert_eq!(parse_type_string("readonly_span<u8>", &table).unwrap(), Type::readonly_span(Type::U8));
    }

    #[test]
    fn parse_capabilities() {
        let table = TypeTable::new();
        assert_eq!(
            parse_type_string("Enumerable<(i32, string)>", &table).unwrap(),
            Type::enumerable(Type::Tuple(vec![Type::I32, Type::String]))
        );
        assert_eq!(parse_type_string("Enumerator", &table).unwrap(), Type::capability(Capability::Enumerator));
        assert!(parse_type_string("AsyncEnumerable", &table).is_err());
        assert!(parse_type_string("Disposable<i32>", &table).is_err());
    }

    #[test]
    fn parse_named() {
        let mut table = TypeTable::new();
        let bag = table.define("Bag", TypeKind::Class).finish().unwrap();
        assert_eq!(parse_type_string("Bag", &table).unwrap(), Type::Named(bag));
        assert_eq!(
            parse_type_string("Missing", &table),
            Err(TypeError::Undefined("Missing".to_string()))
        );
    }
}
