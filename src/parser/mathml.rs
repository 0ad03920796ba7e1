//! MathML front-end
//!
//! Structural translation of the MathML subset the external reader emits
//! (content MathML written by libsbml). The document is read into a small
//! element tree first, then translated node by node; `<apply>` heads map
//! onto operators, calls, relations and logicals, `<piecewise>` maps onto
//! branch nodes, and the time/avogadro csymbols resolve to the context
//! time symbol and the numeric constant respectively.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::SbmlSolError;
use crate::expr::{BinOp, Branch, Expr, LogOp, RelOp, UnOp};
use crate::parser::{ParseContext, AVOGADRO};

#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
    /// Text segments split by `<sep/>` (used by e-notation / rational cn)
    texts: Vec<String>,
}

impl XmlNode {
    fn text(&self) -> String {
        self.texts.first().map(|s| s.trim().to_string()).unwrap_or_default()
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

fn local_name(qualified: &[u8]) -> String {
    let full = String::from_utf8_lossy(qualified);
    match full.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => full.into_owned(),
    }
}

fn read_tree(input: &str) -> Result<XmlNode, SbmlSolError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    let attach = |stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode| {
        match stack.last_mut() {
            Some(parent) => {
                if node.name == "sep" {
                    parent.texts.push(String::new());
                } else {
                    parent.children.push(node);
                }
            }
            None => *root = Some(node),
        }
    };

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let mut node = XmlNode {
                    name: local_name(start.name().as_ref()),
                    texts: vec![String::new()],
                    ..Default::default()
                };
                for attr in start.attributes().flatten() {
                    node.attrs.push((
                        local_name(attr.key.as_ref()),
                        String::from_utf8_lossy(&attr.value).into_owned(),
                    ));
                }
                stack.push(node);
            }
            Event::Empty(start) => {
                let mut node = XmlNode {
                    name: local_name(start.name().as_ref()),
                    texts: vec![String::new()],
                    ..Default::default()
                };
                for attr in start.attributes().flatten() {
                    node.attrs.push((
                        local_name(attr.key.as_ref()),
                        String::from_utf8_lossy(&attr.value).into_owned(),
                    ));
                }
                attach(&mut stack, &mut root, node);
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let decoded = text.xml_content().unwrap_or_default();
                    if let Some(segment) = top.texts.last_mut() {
                        segment.push_str(&decoded);
                    }
                }
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| {
                    SbmlSolError::parse(input, "unbalanced MathML element nesting")
                })?;
                attach(&mut stack, &mut root, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| SbmlSolError::parse(input, "empty MathML document"))
}

/// Translate a MathML document into an expression tree
pub fn translate(input: &str) -> Result<Expr, SbmlSolError> {
    let tree = read_tree(input)?;
    translate_node(&tree, input)
}

fn translate_node(node: &XmlNode, input: &str) -> Result<Expr, SbmlSolError> {
    match node.name.as_str() {
        "math" | "semantics" => {
            let child = node.children.first().ok_or_else(|| {
                SbmlSolError::parse(input, format!("<{}> without content", node.name))
            })?;
            translate_node(child, input)
        }
        "cn" => translate_number(node, input),
        "ci" => Ok(Expr::Symbol(node.text())),
        "csymbol" => translate_csymbol(node, input),
        "true" => Ok(Expr::Number(1.0)),
        "false" => Ok(Expr::Number(0.0)),
        "pi" => Ok(Expr::Number(std::f64::consts::PI)),
        "exponentiale" => Ok(Expr::Number(std::f64::consts::E)),
        "infinity" => Ok(Expr::Number(f64::INFINITY)),
        "apply" => translate_apply(node, input),
        "piecewise" => translate_piecewise(node, input),
        "lambda" => {
            // reader-produced math splits lambdas before they get here;
            // translate just the body if one slips through
            let body = node.children.last().ok_or_else(|| {
                SbmlSolError::parse(input, "<lambda> without a body")
            })?;
            translate_node(body, input)
        }
        "degree" | "logbase" => {
            let child = node.children.first().ok_or_else(|| {
                SbmlSolError::parse(input, format!("<{}> without content", node.name))
            })?;
            translate_node(child, input)
        }
        other => Err(SbmlSolError::parse(
            input,
            format!("unsupported MathML element <{}>", other),
        )),
    }
}

fn translate_number(node: &XmlNode, input: &str) -> Result<Expr, SbmlSolError> {
    let parse_segment = |segment: &str| -> Result<f64, SbmlSolError> {
        segment.trim().parse::<f64>().map_err(|_| {
            SbmlSolError::parse(input, format!("malformed <cn> value '{}'", segment.trim()))
        })
    };

    match node.attr("type") {
        Some("e-notation") => {
            let mantissa = parse_segment(node.texts.first().map(String::as_str).unwrap_or(""))?;
            let exponent = parse_segment(node.texts.get(1).map(String::as_str).unwrap_or(""))?;
            Ok(Expr::Number(mantissa * 10f64.powf(exponent)))
        }
        Some("rational") => {
            let numerator = parse_segment(node.texts.first().map(String::as_str).unwrap_or(""))?;
            let denominator = parse_segment(node.texts.get(1).map(String::as_str).unwrap_or(""))?;
            Ok(Expr::Number(numerator) / Expr::Number(denominator))
        }
        _ => Ok(Expr::Number(parse_segment(&node.text())?)),
    }
}

fn translate_csymbol(node: &XmlNode, input: &str) -> Result<Expr, SbmlSolError> {
    let url = node.attr("definitionURL").unwrap_or_default();
    if url.contains("time") {
        Ok(Expr::Symbol(ParseContext::TIME.to_string()))
    } else if url.contains("avogadro") {
        Ok(Expr::Number(AVOGADRO))
    } else if url.contains("delay") {
        Err(SbmlSolError::unsupported(
            "delay csymbol",
            "delay expressions cannot be compiled",
        ))
    } else {
        Ok(Expr::Symbol(node.text()))
    }
}

fn translate_apply(node: &XmlNode, input: &str) -> Result<Expr, SbmlSolError> {
    let (head, rest) = match node.children.split_first() {
        Some(split) => split,
        None => return Err(SbmlSolError::parse(input, "empty <apply>")),
    };

    // <root> and <log> carry a qualifier element before the operand
    let (qualifier, operands): (Option<&XmlNode>, &[XmlNode]) = match rest.first() {
        Some(first) if first.name == "degree" || first.name == "logbase" => {
            (Some(first), &rest[1..])
        }
        _ => (None, rest),
    };

    let args: Vec<Expr> = operands
        .iter()
        .map(|child| translate_node(child, input))
        .collect::<Result<_, _>>()?;

    let binary = |op: BinOp, args: Vec<Expr>| -> Result<Expr, SbmlSolError> {
        let mut args = args;
        if args.len() != 2 {
            return Err(SbmlSolError::parse(
                input,
                format!("<{}> expects two operands, got {}", head.name, args.len()),
            ));
        }
        let rhs = args.pop().expect("len checked");
        let lhs = args.pop().expect("len checked");
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    };

    let relation = |op: RelOp, args: Vec<Expr>| -> Result<Expr, SbmlSolError> {
        let mut args = args;
        if args.len() != 2 {
            return Err(SbmlSolError::parse(
                input,
                format!("<{}> expects two operands, got {}", head.name, args.len()),
            ));
        }
        let rhs = args.pop().expect("len checked");
        let lhs = args.pop().expect("len checked");
        Ok(Expr::Relation(op, Box::new(lhs), Box::new(rhs)))
    };

    let unary_call = |name: &str, args: Vec<Expr>| -> Result<Expr, SbmlSolError> {
        if args.len() != 1 {
            return Err(SbmlSolError::parse(
                input,
                format!("<{}> expects one operand, got {}", name, args.len()),
            ));
        }
        Ok(Expr::Call(name.to_string(), args))
    };

    match head.name.as_str() {
        "plus" => Ok(args
            .into_iter()
            .fold(Expr::zero(), |acc, arg| acc + arg)),
        "minus" => {
            let mut args = args;
            match args.len() {
                1 => Ok(-args.pop().expect("len checked")),
                2 => {
                    let rhs = args.pop().expect("len checked");
                    let lhs = args.pop().expect("len checked");
                    Ok(Expr::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs)))
                }
                n => Err(SbmlSolError::parse(
                    input,
                    format!("<minus> expects one or two operands, got {}", n),
                )),
            }
        }
        "times" => Ok(args
            .into_iter()
            .fold(Expr::Number(1.0), |acc, arg| acc * arg)),
        "divide" => binary(BinOp::Div, args),
        "power" => binary(BinOp::Pow, args),
        "root" => {
            let mut args = args;
            if args.len() != 1 {
                return Err(SbmlSolError::parse(input, "<root> expects one operand"));
            }
            let operand = args.pop().expect("len checked");
            match qualifier {
                Some(degree) => {
                    let degree = translate_node(degree, input)?;
                    if degree.as_integer() == Some(2) {
                        Ok(Expr::Call("sqrt".into(), vec![operand]))
                    } else {
                        Ok(operand.pow(Expr::Number(1.0) / degree))
                    }
                }
                None => Ok(Expr::Call("sqrt".into(), vec![operand])),
            }
        }
        "log" => {
            let mut args = args;
            if args.len() != 1 {
                return Err(SbmlSolError::parse(input, "<log> expects one operand"));
            }
            let operand = args.pop().expect("len checked");
            match qualifier {
                Some(base) => {
                    let base = translate_node(base, input)?;
                    Ok(Expr::Call("ln".into(), vec![operand])
                        / Expr::Call("ln".into(), vec![base]))
                }
                None => Ok(Expr::Call("log".into(), vec![operand])),
            }
        }
        "exp" => unary_call("exp", args),
        "ln" => unary_call("ln", args),
        "abs" => unary_call("abs", args),
        "sin" => unary_call("sin", args),
        "cos" => unary_call("cos", args),
        "tan" => unary_call("tan", args),
        "gt" => relation(RelOp::Gt, args),
        "lt" => relation(RelOp::Lt, args),
        "geq" => relation(RelOp::Ge, args),
        "leq" => relation(RelOp::Le, args),
        "eq" => relation(RelOp::Eq, args),
        "neq" => relation(RelOp::Ne, args),
        "and" => Ok(Expr::Logical(LogOp::And, args)),
        "or" => Ok(Expr::Logical(LogOp::Or, args)),
        "not" => {
            let mut args = args;
            match (args.pop(), args.is_empty()) {
                (Some(operand), true) => Ok(Expr::Unary(UnOp::Not, Box::new(operand))),
                _ => Err(SbmlSolError::parse(input, "<not> expects one operand")),
            }
        }
        // a <ci> head is a user-defined function application, resolved by
        // the inliner after translation
        "ci" => Ok(Expr::Call(head.text(), args)),
        "csymbol" => match translate_csymbol(head, input)? {
            Expr::Symbol(name) => Ok(Expr::Call(name, args)),
            _ => Err(SbmlSolError::parse(input, "csymbol head is not callable")),
        },
        other => Err(SbmlSolError::parse(
            input,
            format!("unsupported MathML operator <{}>", other),
        )),
    }
}

fn translate_piecewise(node: &XmlNode, input: &str) -> Result<Expr, SbmlSolError> {
    let mut branches = Vec::new();
    let mut default = None;
    for child in &node.children {
        match child.name.as_str() {
            "piece" => {
                if child.children.len() != 2 {
                    return Err(SbmlSolError::parse(
                        input,
                        "<piece> expects a value and a condition",
                    ));
                }
                branches.push(Branch {
                    value: translate_node(&child.children[0], input)?,
                    condition: translate_node(&child.children[1], input)?,
                });
            }
            "otherwise" => {
                let value = child.children.first().ok_or_else(|| {
                    SbmlSolError::parse(input, "<otherwise> without content")
                })?;
                default = Some(Box::new(translate_node(value, input)?));
            }
            other => {
                return Err(SbmlSolError::parse(
                    input,
                    format!("unexpected <{}> inside <piecewise>", other),
                ));
            }
        }
    }
    Ok(Expr::Piecewise { branches, default })
}
