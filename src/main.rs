fn main() {
    free_surface_sph::start();
}
