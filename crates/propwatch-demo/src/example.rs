#![forbid(unsafe_code)]

//! The `Example` walkthrough.
//!
//! `Example.expensive` watches a class attribute, an instance field and an
//! accessor. The script reads it twice after each write. The compute
//! function counts its own runs, and a calculation marker is printed for
//! every read that ran it. The final write goes to an unwatched name and
//! must not trigger a recomputation.

use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use propwatch_core::{Instance, Property, TypeBuilder, TypeDef, WatchError};
use tracing::{debug, info};

use crate::error::Result;

pub const CALCULATING: &str = "<Calculating expensive property...>";

/// Build the `Example` type. Each computation sleeps for `delay` and bumps
/// `calculations`.
pub fn example_type(
    delay: Duration,
    calculations: &Rc<Cell<u32>>,
) -> Result<Rc<TypeDef<String>>> {
    let calculations = Rc::clone(calculations);
    let ty = TypeBuilder::new("Example")
        .class_attr("class_var", "a class variable".to_string())
        .init(|ex| {
            ex.set("instance_var", "an instance variable".into())?;
            ex.set("prop", "a property".into())?;
            ex.set("other_attr", "not watched".into())
        })
        .accessor("prop", Property::backed_by("_prop"))
        .watch(
            "expensive",
            ["class_var", "instance_var", "prop"],
            move |ex: &Instance<String>| {
                calculations.set(calculations.get() + 1);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                Ok(format!(
                    "{}, {}, and {} walk into a bar.",
                    ex.get("class_var")?,
                    ex.get("instance_var")?,
                    ex.get("prop")?
                ))
            },
        )
        .build()?;
    Ok(ty)
}

fn show(ex: &Instance<String>, calculations: &Cell<u32>, out: &mut impl Write) -> Result<()> {
    let before = calculations.get();
    let value = ex.get("expensive")?;
    if calculations.get() > before {
        writeln!(out, "{CALCULATING}")?;
    }
    writeln!(out, "{value}")?;
    Ok(())
}

/// Run the scripted sequence, writing the transcript to `out`.
///
/// Returns the number of times `expensive` was computed.
pub fn run_script(delay: Duration, out: &mut impl Write) -> Result<u32> {
    let calculations = Rc::new(Cell::new(0));
    let ty = example_type(delay, &calculations)?;
    let ex = TypeDef::instantiate(&ty)?;

    let watcher = ty
        .watcher("expensive")
        .ok_or_else(|| WatchError::not_found(ty.name(), "expensive"))?;
    writeln!(out, "{watcher}")?;

    let steps: [Option<(&str, &str)>; 5] = [
        None,
        Some(("class_var", "an apple")),
        Some(("prop", "a banana")),
        Some(("instance_var", "a pear")),
        Some(("other_attr", "a peach")),
    ];

    for step in steps {
        if let Some((name, value)) = step {
            debug!(attr = name, value, "assign");
            ex.set(name, value.to_string())?;
        }
        for _ in 0..2 {
            show(&ex, &calculations, out)?;
        }
    }

    let computed = calculations.get();
    info!(computed, "script finished");
    Ok(computed)
}
