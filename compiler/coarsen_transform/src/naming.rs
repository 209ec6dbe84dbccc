//! Symbol names of coarsened kernel variants.
//!
//! A variant of kernel `k` coarsened along dimension `d` is named by
//! appending `_<d>_<block factor>_<thread factor>_<stride>` to the kernel's
//! identifier. For Itanium-mangled names the suffix goes inside the
//! mangling, on the innermost name component, and that component's length
//! prefix is rewritten, so the variant still demangles to a function with
//! the original parameter list:
//!
//! ```text
//! _Z7myKernelPi       ->  _Z16myKernel_0_1_4_2Pi
//! _ZN2ns6kernelEPi    ->  _ZN2ns14kernel_0_1_4_2EPi
//! ```
//!
//! Names that do not parse as mangled get the suffix appended.

use std::ops::Range;

use coarsen_analysis::Dimension;

/// `_<dimension index>_<block factor>_<thread factor>_<stride>`.
pub fn variant_suffix(dim: Dimension, block_factor: u32, thread_factor: u32, stride: u32) -> String {
    format!("_{}_{block_factor}_{thread_factor}_{stride}", dim.index())
}

/// Name of the variant of `name` with the given coarsening.
pub fn named_kernel_version(
    name: &str,
    dim: Dimension,
    block_factor: u32,
    thread_factor: u32,
    stride: u32,
) -> String {
    let suffix = variant_suffix(dim, block_factor, thread_factor, stride);
    let Some(last) = mangled_components(name).and_then(|mut components| components.pop()) else {
        return format!("{name}{suffix}");
    };
    let ident = &name[last.ident.clone()];
    format!(
        "{}{}{ident}{suffix}{}",
        &name[..last.len_at],
        ident.len() + suffix.len(),
        &name[last.ident.end..]
    )
}

/// The qualified source name a kernel is selected by: `ns::kernel` for
/// `_ZN2ns6kernelEPi`, `myKernel` for `_Z7myKernelPi`, and the name itself
/// when it is not mangled.
pub fn base_name(name: &str) -> String {
    match mangled_components(name) {
        Some(components) => components
            .iter()
            .map(|component| &name[component.ident.clone()])
            .collect::<Vec<_>>()
            .join("::"),
        None => name.to_owned(),
    }
}

/// A `<length><identifier>` source name inside a mangled symbol.
#[derive(Clone, Debug)]
struct Component {
    /// Byte offset of the length digits.
    len_at: usize,
    ident: Range<usize>,
}

/// Name components of an Itanium function symbol, outermost first.
///
/// Handles plain (`_Z<name>`), internal-linkage (`_ZL<name>`) and nested
/// (`_ZN[cv]<name>+E`) encodings. Substitutions and operator names are not
/// needed for kernels and make the symbol unparseable here.
fn mangled_components(name: &str) -> Option<Vec<Component>> {
    let bytes = name.as_bytes();
    if !name.starts_with("_Z") {
        return None;
    }
    let mut pos = 2;
    if bytes.get(pos) == Some(&b'L') {
        pos += 1;
    }
    let nested = bytes.get(pos) == Some(&b'N');
    if nested {
        pos += 1;
        while matches!(bytes.get(pos), Some(b'K' | b'V' | b'r')) {
            pos += 1;
        }
    }

    let mut components = Vec::new();
    loop {
        let mut component = source_name(name, pos)?;
        if !nested {
            recover_short_length(name, &mut component);
            components.push(component);
            return Some(components);
        }
        pos = component.ident.end;
        components.push(component);
        match bytes.get(pos) {
            Some(b'0'..=b'9') => {}
            Some(b'E' | b'I') => return Some(components),
            _ => return None,
        }
    }
}

/// Some producers count a plain identifier one byte short, leaving its last
/// letter in front of a compound parameter type: `_Z7myKernelPi` names
/// `myKernel(int*)`. A lowercase letter wedged between a lowercase
/// identifier end and an uppercase type code is taken back into the
/// identifier.
fn recover_short_length(name: &str, component: &mut Component) {
    let bytes = name.as_bytes();
    let end = component.ident.end;
    let wedged = end > component.ident.start
        && bytes[end - 1].is_ascii_lowercase()
        && bytes.get(end).is_some_and(u8::is_ascii_lowercase)
        && bytes.get(end + 1).is_some_and(u8::is_ascii_uppercase);
    if wedged {
        component.ident.end += 1;
    }
}

fn source_name(name: &str, at: usize) -> Option<Component> {
    let rest = name.get(at..)?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let len: usize = rest[..digits].parse().ok()?;
    let start = at + digits;
    let end = start.checked_add(len)?;
    name.get(start..end)?;
    Some(Component {
        len_at: at,
        ident: start..end,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
