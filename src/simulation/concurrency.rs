pub use internal::*;

#[cfg(feature = "sequential")]
mod internal {
    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
        arr1: &mut [T1],
        arr2: &mut [T2],
        f: F,
    ) {
        arr1.iter_mut()
            .zip(arr2.iter_mut())
            .enumerate()
            .for_each(|(idx, (v1, v2))| {
                f(idx, v1, v2);
            });
    }

    pub fn par_iter_mut1_gather<
        T1: Send + Sync,
        X: Send,
        F: Fn(usize, &mut T1, &mut Vec<X>) + Send + Sync,
    >(
        arr1: &mut [T1],
        f: F,
    ) -> Vec<X> {
        let mut gathered = Vec::new();
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1, &mut gathered);
        });
        gathered
    }
}

#[cfg(not(feature = "sequential"))]
mod internal {
    use rayon::prelude::*;

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
        arr1: &mut [T1],
        arr2: &mut [T2],
        f: F,
    ) {
        arr1.into_par_iter()
            .zip(arr2.into_par_iter())
            .enumerate()
            .for_each(|(idx, (v1, v2))| {
                f(idx, v1, v2);
            });
    }

    /**
     * Like `par_iter_mut1`, but every worker additionally owns a local list which `f` may push to.
     * The lists are concatenated in index order after the pass.
     */
    pub fn par_iter_mut1_gather<
        T1: Send + Sync,
        X: Send,
        F: Fn(usize, &mut T1, &mut Vec<X>) + Send + Sync,
    >(
        arr1: &mut [T1],
        f: F,
    ) -> Vec<X> {
        arr1.into_par_iter()
            .enumerate()
            .fold(Vec::new, |mut local, (idx, v1)| {
                f(idx, v1, &mut local);
                local
            })
            .reduce(Vec::new, |mut a, mut b| {
                a.append(&mut b);
                a
            })
    }
}
