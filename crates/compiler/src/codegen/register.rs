//! Register binding lowering
//!
//! Every register member becomes a `#define` over a volatile-qualified
//! typed memory reference:
//!
//! ```c
//! #define GPIO7_DR (*(volatile uint32_t*)(0x42004000 + 0x0))
//! ```
//!
//! Read-only members get a const-qualified pointee so writes through the
//! macro fail to compile.

use crate::ast::AccessMode;
use crate::symbols::RegisterInfo;
use crate::types::Type;
use std::fmt::Write as _;

use super::CodeGen;
use super::error::CodeGenError;

impl CodeGen<'_> {
    /// Emit the macro block for one register declaration
    pub(crate) fn emit_register(
        &mut self,
        info: &RegisterInfo,
        prefix: &str,
        out: &mut String,
    ) -> Result<(), CodeGenError> {
        let base = self.emit_expr(&info.base)?;
        for member in &info.members {
            let c_type = self.register_member_c_type(&member.ty)?;
            let cast = match member.access {
                AccessMode::Ro => format!("volatile {} const *", c_type),
                AccessMode::Rw | AccessMode::Wo | AccessMode::W1c | AccessMode::W1s => {
                    format!("volatile {}*", c_type)
                }
            };
            let offset = self.emit_expr(&member.offset)?;
            writeln!(
                out,
                "#define {}{}_{} (*({})({} + {}))",
                prefix, info.name, member.name, cast, base, offset
            )?;
        }
        writeln!(out)?;
        Ok(())
    }

    fn register_member_c_type(&mut self, ty: &Type) -> Result<String, CodeGenError> {
        let resolved = self.resolve_type(ty);
        Ok(match &resolved {
            Type::Bitmap { bit_width, .. } => {
                crate::types::bitmap_backing_c_type(*bit_width).to_string()
            }
            other => self.c_type_name(other),
        })
    }
}

/// Mask text for a `width`-bit field, e.g. 0x3U for two bits
pub fn bit_mask_text(width: i128) -> String {
    if (1..=64).contains(&width) {
        let mask: u128 = (1u128 << width) - 1;
        format!("{:#x}U", mask)
    } else {
        // Non-constant or out-of-range widths keep the expression form
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_mask_text() {
        assert_eq!(bit_mask_text(1), "0x1U");
        assert_eq!(bit_mask_text(2), "0x3U");
        assert_eq!(bit_mask_text(4), "0xfU");
        assert_eq!(bit_mask_text(8), "0xffU");
        assert_eq!(bit_mask_text(0), "");
    }
}
