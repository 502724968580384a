/*!
 * datamem demo
 *
 * Runs the policy-swap scenario end to end:
 * - install the "shift" table and allocate an array with it
 * - restore the default and allocate a second array
 * - resize and drop both, then report what each table saw
 */

use anyhow::{ensure, Context, Result};
use datamem::{
    init_tracing, init_tracker, install_policy, query_current_policy_name,
    query_object_policy_name, AllocationTracker, DataArray, ShiftAllocator,
};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();
    let tracker = init_tracker(AllocationTracker::new());

    let shift = ShiftAllocator::new();
    let table = shift.handler().context("building shift table")?;

    let previous = install_policy(Some(table))?;
    info!(
        previous = previous.as_ref().map_or("<default>", |t| t.name()),
        current = %query_current_policy_name(),
        "installed shift policy"
    );

    let mut shifted = DataArray::zeros(1024, 8)?;
    install_policy(None)?;
    let mut plain = DataArray::filled(256, &1.5f64.to_ne_bytes())?;

    info!(
        shifted = query_object_policy_name(&shifted),
        plain = query_object_policy_name(&plain),
        current = %query_current_policy_name(),
        "arrays keep the policy they were allocated with"
    );
    ensure!(query_object_policy_name(&shifted) == "shift");

    shifted.resize(4096)?;
    plain.resize(64)?;
    drop(shifted);
    drop(plain);

    let stats = shift.stats();
    let freed = shift.take_freed_sizes();
    ensure!(
        freed == vec![4096 * 8],
        "shift table was freed with the wrong size: {:?}",
        freed
    );

    println!("shift table:   {}", serde_json::to_string_pretty(&stats)?);
    println!(
        "default table: {}",
        serde_json::to_string_pretty(&tracker.snapshot())?
    );
    Ok(())
}
