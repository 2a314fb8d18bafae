//! Support-code text: saturating arithmetic helpers and the IRQ wrapper
//! header emitted alongside translated files.

use crate::ast::AssignOp;
use crate::types::PrimitiveKind;
use std::fmt::Write as _;

/// Name of a saturating helper: cnx_clamp_<op>_<type>
pub fn clamp_helper_name(op: AssignOp, kind: PrimitiveKind) -> String {
    let op_name = op.clamp_name().expect("clampable op checked by caller");
    format!("cnx_clamp_{}_{}", op_name, kind.dialect_name())
}

/// Definition of one saturating helper, emitted once per translation unit
/// that uses it. Unsigned forms test against the limit before operating;
/// signed forms detect overflow from operand signs.
pub fn clamp_helper_definition(op: AssignOp, kind: PrimitiveKind) -> String {
    let name = clamp_helper_name(op, kind);
    let c_type = kind.c_name();
    let (min, max) = kind.c_limits().expect("integer kind checked by caller");
    let mut text = String::new();

    let _ = writeln!(text, "static {} {}({} a, {} b)", c_type, name, c_type, c_type);
    let _ = writeln!(text, "{{");
    match (op, kind.is_signed()) {
        (AssignOp::Add, false) => {
            let _ = writeln!(text, "    if (a > ({})({} - b)) {{", c_type, max);
            let _ = writeln!(text, "        return {};", max);
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    return ({})(a + b);", c_type);
        }
        (AssignOp::Sub, false) => {
            let _ = writeln!(text, "    if (a < b) {{");
            let _ = writeln!(text, "        return 0;");
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    return ({})(a - b);", c_type);
        }
        (AssignOp::Mul, false) => {
            let _ = writeln!(text, "    if ((b != 0) && (a > ({})({} / b))) {{", c_type, max);
            let _ = writeln!(text, "        return {};", max);
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    return ({})(a * b);", c_type);
        }
        (AssignOp::Add, true) => {
            let _ = writeln!(text, "    if ((b > 0) && (a > ({})({} - b))) {{", c_type, max);
            let _ = writeln!(text, "        return {};", max);
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    if ((b < 0) && (a < ({})({} - b))) {{", c_type, min);
            let _ = writeln!(text, "        return {};", min);
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    return ({})(a + b);", c_type);
        }
        (AssignOp::Sub, true) => {
            let _ = writeln!(text, "    if ((b < 0) && (a > ({})({} + b))) {{", c_type, max);
            let _ = writeln!(text, "        return {};", max);
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    if ((b > 0) && (a < ({})({} + b))) {{", c_type, min);
            let _ = writeln!(text, "        return {};", min);
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    return ({})(a - b);", c_type);
        }
        (AssignOp::Mul, true) => {
            let _ = writeln!(text, "    if ((a == 0) || (b == 0)) {{");
            let _ = writeln!(text, "        return 0;");
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    if (a > 0) {{");
            let _ = writeln!(text, "        if ((b > 0) && (a > ({})({} / b))) {{", c_type, max);
            let _ = writeln!(text, "            return {};", max);
            let _ = writeln!(text, "        }}");
            let _ = writeln!(text, "        if ((b < 0) && (b < ({})({} / a))) {{", c_type, min);
            let _ = writeln!(text, "            return {};", min);
            let _ = writeln!(text, "        }}");
            let _ = writeln!(text, "    }} else {{");
            let _ = writeln!(text, "        if ((b > 0) && (a < ({})({} / b))) {{", c_type, min);
            let _ = writeln!(text, "            return {};", min);
            let _ = writeln!(text, "        }}");
            let _ = writeln!(text, "        if ((b < 0) && (a < ({})({} / b))) {{", c_type, max);
            let _ = writeln!(text, "            return {};", max);
            let _ = writeln!(text, "        }}");
            let _ = writeln!(text, "    }}");
            let _ = writeln!(text, "    return ({})(a * b);", c_type);
        }
        _ => unreachable!("clamp helpers exist only for +, -, *"),
    }
    let _ = writeln!(text, "}}");
    text
}

/// Header file name for the interrupt-mask wrappers
pub const IRQ_WRAPPERS_HEADER: &str = "cnx_irq.h";

/// CMSIS core header providing `__LDREX*`/`__STREX*`
pub const CMSIS_HEADER: &str = "cmsis_gcc.h";

/// Content of the emitted `cnx_irq.h`: thin wrappers over the CMSIS
/// PRIMASK intrinsics so translated code never names vendor intrinsics
/// directly. Falls back to no-ops on hosts without them, which keeps unit
/// tests of generated code compilable off-target.
pub fn irq_wrappers_header_content(banner: &str) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{}", banner);
    let _ = writeln!(text, "#ifndef CNX_IRQ_H");
    let _ = writeln!(text, "#define CNX_IRQ_H");
    let _ = writeln!(text);
    let _ = writeln!(text, "#include <stdint.h>");
    let _ = writeln!(text);
    let _ = writeln!(text, "#if defined(__arm__) || defined(__ARM_ARCH)");
    let _ = writeln!(text, "#include \"{}\"", CMSIS_HEADER);
    let _ = writeln!(text);
    let _ = writeln!(text, "static inline uint32_t __cnx_get_PRIMASK(void)");
    let _ = writeln!(text, "{{");
    let _ = writeln!(text, "    return __get_PRIMASK();");
    let _ = writeln!(text, "}}");
    let _ = writeln!(text);
    let _ = writeln!(text, "static inline void __cnx_set_PRIMASK(uint32_t primask)");
    let _ = writeln!(text, "{{");
    let _ = writeln!(text, "    __set_PRIMASK(primask);");
    let _ = writeln!(text, "}}");
    let _ = writeln!(text);
    let _ = writeln!(text, "static inline void __cnx_disable_irq(void)");
    let _ = writeln!(text, "{{");
    let _ = writeln!(text, "    __disable_irq();");
    let _ = writeln!(text, "}}");
    let _ = writeln!(text, "#else");
    let _ = writeln!(text);
    let _ = writeln!(text, "static inline uint32_t __cnx_get_PRIMASK(void)");
    let _ = writeln!(text, "{{");
    let _ = writeln!(text, "    return 0;");
    let _ = writeln!(text, "}}");
    let _ = writeln!(text);
    let _ = writeln!(text, "static inline void __cnx_set_PRIMASK(uint32_t primask)");
    let _ = writeln!(text, "{{");
    let _ = writeln!(text, "    (void)primask;");
    let _ = writeln!(text, "}}");
    let _ = writeln!(text);
    let _ = writeln!(text, "static inline void __cnx_disable_irq(void)");
    let _ = writeln!(text, "{{");
    let _ = writeln!(text, "}}");
    let _ = writeln!(text, "#endif");
    let _ = writeln!(text);
    let _ = writeln!(text, "#endif /* CNX_IRQ_H */");
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_names() {
        assert_eq!(
            clamp_helper_name(AssignOp::Add, PrimitiveKind::U32),
            "cnx_clamp_add_u32"
        );
        assert_eq!(
            clamp_helper_name(AssignOp::Sub, PrimitiveKind::I16),
            "cnx_clamp_sub_i16"
        );
        assert_eq!(
            clamp_helper_name(AssignOp::Mul, PrimitiveKind::U8),
            "cnx_clamp_mul_u8"
        );
    }

    #[test]
    fn test_unsigned_add_saturates_at_max() {
        let text = clamp_helper_definition(AssignOp::Add, PrimitiveKind::U32);
        assert!(text.contains("static uint32_t cnx_clamp_add_u32(uint32_t a, uint32_t b)"));
        assert!(text.contains("UINT32_MAX"));
    }

    #[test]
    fn test_unsigned_sub_saturates_at_zero() {
        let text = clamp_helper_definition(AssignOp::Sub, PrimitiveKind::U8);
        assert!(text.contains("return 0;"));
    }

    #[test]
    fn test_signed_add_has_both_limits() {
        let text = clamp_helper_definition(AssignOp::Add, PrimitiveKind::I32);
        assert!(text.contains("INT32_MAX"));
        assert!(text.contains("INT32_MIN"));
    }

    #[test]
    fn test_irq_header_has_wrappers() {
        let text = irq_wrappers_header_content("/* banner */");
        assert!(text.starts_with("/* banner */"));
        assert!(text.contains("__cnx_get_PRIMASK"));
        assert!(text.contains("__cnx_set_PRIMASK"));
        assert!(text.contains("__cnx_disable_irq"));
        assert!(text.contains("#ifndef CNX_IRQ_H"));
    }
}
