//! Parallel or sequential mapping, selected by the `parallel` feature.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Map `f` over `slice`, preserving order.
///
/// Runs on rayon when the `parallel` feature is enabled and
/// `force_sequential` is false.
pub fn map_slice<T, F, R>(slice: &[T], f: F, force_sequential: bool) -> Vec<R>
where
    T: Sync,
    F: Fn(&T) -> R + Sync + Send,
    R: Send,
{
    #[cfg(feature = "parallel")]
    {
        if force_sequential {
            slice.iter().map(f).collect()
        } else {
            slice.par_iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = force_sequential;
        slice.iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_slice_preserves_order() {
        let items: Vec<u32> = (0..100).collect();
        let parallel = map_slice(&items, |x| x * 2, false);
        let sequential = map_slice(&items, |x| x * 2, true);
        assert_eq!(parallel, sequential);
        assert_eq!(parallel[99], 198);
    }
}
