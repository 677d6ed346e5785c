// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Display implementations for graph types.

use std::fmt;

use skein_bind::MemberRef;

use crate::graph::*;

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegionKind::Root => "root",
            RegionKind::LocalsScope => "locals",
            RegionKind::TryFinally => "try_finally",
            RegionKind::Try => "try",
            RegionKind::Finally => "finally",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Capture(id) => write!(f, "t{}", id.0),
            Value::Local(id) => write!(f, "_{}", id.0),
            Value::Expr { text, .. } => write!(f, "{}", text),
            Value::Const(c) => write!(f, "{}", c),
            Value::EmptyCollection(elem) => write!(f, "[]: [{}]", elem),
            Value::Invalid => write!(f, "<invalid>"),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Value]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 { write!(f, ", ")?; }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rvalue::Use(v) => write!(f, "{}", v),
            Rvalue::Convert { value, conversion } => write!(f, "({} as {})", value, conversion.to),
            Rvalue::Call { member, receiver, args } => {
                let extension = member.binding().is_some_and(|b| b.is_extension);
                match receiver {
                    Some(recv) if extension => {
                        write!(f, "{}({}", member.name(), recv)?;
                        for arg in args {
                            write!(f, ", {}", arg)?;
                        }
                        write!(f, ")")
                    }
                    Some(recv) => {
                        if let MemberRef::Deferred { .. } = member {
                            write!(f, "{}.dyn {}(", recv, member.name())?;
                        } else {
                            write!(f, "{}.{}(", recv, member.name())?;
                        }
                        write_args(f, args)?;
                        write!(f, ")")
                    }
                    None => {
                        write!(f, "{}(", member.name())?;
                        write_args(f, args)?;
                        write!(f, ")")
                    }
                }
            }
            Rvalue::Await(inner) => write!(f, "await {}", inner),
            Rvalue::ElementRef { value, read_only: true } => write!(f, "ref readonly {}", value),
            Rvalue::ElementRef { value, read_only: false } => write!(f, "ref {}", value),
            Rvalue::IsNull(v) => write!(f, "{} == null", v),
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Place::Local(id) => write!(f, "_{}", id.0),
            Place::Named(name) => write!(f, "{}", name),
            Place::Expr { text, .. } => write!(f, "{}", text),
            Place::Discard => write!(f, "_"),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Bind { place, conversion } if conversion.is_identity() => write!(f, "{}", place),
            Pattern::Bind { place, conversion } => write!(f, "{}: {}", place, conversion.to),
            Pattern::Tuple { elements, .. } => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Capture { id, value } => write!(f, "t{} = {}", id.0, value),
            Operation::Assign { place, value } => write!(f, "{} = {}", place, value),
            Operation::Deconstruct { pattern, value } => write!(f, "{} = {}", pattern, value),
            Operation::Eval(value) => write!(f, "{}", value),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.target.0)?;
        if !self.finalizing.is_empty() {
            write!(f, " via [")?;
            for (i, r) in self.finalizing.iter().enumerate() {
                if i > 0 { write!(f, ", ")?; }
                write!(f, "r{}", r.0)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto(edge) => write!(f, "goto {}", edge),
            Terminator::ConditionalGoto { condition, jump_if_true, target, fallthrough } => {
                let not = if *jump_if_true { "" } else { "!" };
                write!(f, "if {}({}) goto {} else {}", not, condition, target, fallthrough)
            }
            Terminator::Return { value: Some(v), edge } => write!(f, "return {} -> {}", v, edge),
            Terminator::Return { value: None, edge } => write!(f, "return -> {}", edge),
            Terminator::Throw(v) => write!(f, "throw {}", v),
            Terminator::EndFinally => write!(f, "end_finally"),
            Terminator::Exit => write!(f, "exit"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for ControlFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {} {{", self.name)?;

        for region in &self.regions[1..] {
            write!(f, "  r{}: {} in r{}", region.id.0, region.kind, region.parent.map_or(0, |p| p.0))?;
            for local in &region.locals {
                let l = self.local(*local);
                match &l.name {
                    Some(name) => write!(f, ", {}: {} (_{})", name, l.ty, l.id.0)?,
                    None => write!(f, ", _{}: {}", l.id.0, l.ty)?,
                }
            }
            for capture in &region.captures {
                write!(f, ", t{}: {}", capture.0, self.captures[capture.0 as usize].ty)?;
            }
            writeln!(f)?;
        }
        if self.regions.len() > 1 {
            writeln!(f)?;
        }

        for block in self.blocks_in_order() {
            if block.region == ControlFlowGraph::ROOT {
                writeln!(f, "  bb{}:", block.id.0)?;
            } else {
                writeln!(f, "  bb{}: r{}", block.id.0, block.region.0)?;
            }
            for op in &block.operations {
                writeln!(f, "    {}", op)?;
            }
            writeln!(f, "    {}", block.terminator)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use skein_ast::RefKind;
    use skein_bind::CursorOp;
    use skein_types::{ConstValue, Type};

    use super::*;
    use crate::builder::GraphBuilder;

    #[test]
    fn renders_regions_and_finally_edges() {
        let mut b = GraphBuilder::new("f");
        let scope = b.open_region(RegionKind::LocalsScope);
        let t0 = b.capture(Type::I32);
        let x = b.declare_local(Some("x".into()), Type::I32, RefKind::Value);
        let body = b.reserve_block();
        b.goto(body);
        let try_finally = b.open_region(RegionKind::TryFinally);
        let try_region = b.open_region(RegionKind::Try);
        b.place_block(body);
        b.push(Operation::Capture { id: t0, value: Rvalue::Use(Value::Const(ConstValue::Int(1))) });
        b.push(Operation::Assign {
            place: Place::Local(x),
            value: Rvalue::Call {
                member: MemberRef::Intrinsic(CursorOp::Current),
                receiver: Some(Box::new(Rvalue::Use(Value::Capture(t0)))),
                args: vec![],
            },
        });
        let after = b.reserve_block();
        b.goto(after);
        b.close_region(try_region);
        let finally = b.open_region(RegionKind::Finally);
        b.create_block();
        b.terminate(Terminator::EndFinally);
        b.close_region(finally);
        b.close_region(try_finally);
        b.close_region(scope);
        b.place_block(after);
        let g = b.finish();

        let expected = "\
method f {
  r1: locals in r0, x: i32 (_0), t0: i32
  r2: try_finally in r1
  r3: try in r2
  r4: finally in r2

  bb0:
    goto bb2
  bb2: r3
    t0 = 1
    _0 = t0.current()
    goto bb3 via [r4]
  bb4: r4
    end_finally
  bb3:
    return -> bb1
  bb1:
    exit
}";
        assert_eq!(g.to_string(), expected);
    }
}
